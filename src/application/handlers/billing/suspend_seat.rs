//! SuspendSeatHandler - pauses a seat's billing, keeping it linked.

use std::sync::Arc;

use serde::Serialize;

use crate::application::account_writer::AccountWriter;
use crate::domain::billing::{BillingError, Seat, SeatBilling};
use crate::domain::foundation::{AccountId, CandidateId};
use crate::ports::{GatewayClient, SeatStore};

use super::{seat_billing, SeatCounter};

#[derive(Debug, Clone)]
pub struct SuspendSeatCommand {
    pub account_id: AccountId,
    pub candidate_id: CandidateId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuspendSeatResult {
    pub seat: Seat,
    pub seat_count: u32,
}

pub struct SuspendSeatHandler {
    writer: AccountWriter,
    seats: Arc<dyn SeatStore>,
    gateway: Arc<dyn GatewayClient>,
    seat_counter: SeatCounter,
}

impl SuspendSeatHandler {
    pub fn new(
        writer: AccountWriter,
        seats: Arc<dyn SeatStore>,
        gateway: Arc<dyn GatewayClient>,
        seat_counter: SeatCounter,
    ) -> Self {
        Self {
            writer,
            seats,
            gateway,
            seat_counter,
        }
    }

    /// Cancels the seat's gateway billing, then marks it suspended.
    ///
    /// Unlike removal the cancellation must succeed. Suspending an already
    /// suspended seat just recounts.
    pub async fn handle(&self, cmd: SuspendSeatCommand) -> Result<SuspendSeatResult, BillingError> {
        let seat =
            seat_billing::find_account_seat(self.seats.as_ref(), cmd.account_id, &cmd.candidate_id)
                .await?;

        if seat.billing == SeatBilling::Active {
            if let Some(subscription_id) = &seat.external_subscription_id {
                seat_billing::cancel_subscription(self.gateway.as_ref(), subscription_id).await?;
            }
        }

        let guard = self.writer.locks().lock(cmd.account_id).await;
        let mut seat =
            seat_billing::find_account_seat(self.seats.as_ref(), cmd.account_id, &cmd.candidate_id)
                .await?;
        if seat.billing == SeatBilling::Active {
            seat.suspend()?;
            self.seats.save_seat(&seat).await?;
        }
        let account = self
            .seat_counter
            .recount_held(&guard, cmd.account_id)
            .await?;

        tracing::info!(
            account_id = %cmd.account_id,
            candidate_id = %cmd.candidate_id,
            seat_count = account.seat_count,
            "Seat suspended"
        );
        Ok(SuspendSeatResult {
            seat,
            seat_count: account.seat_count,
        })
    }
}
