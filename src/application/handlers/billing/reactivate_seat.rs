//! ReactivateSeatHandler - restarts billing on a suspended seat.
//!
//! Reactivation buys the seat again: it opens a pending reservation with a
//! fresh charge, and the seat stays suspended and uncounted until the
//! payment webhook promotes it.

use std::sync::Arc;

use serde::Serialize;

use crate::application::account_writer::AccountWriter;
use crate::domain::billing::{BillingError, BillingMethod, Seat, SeatBilling, SeatCandidate};
use crate::domain::foundation::{AccountId, CandidateId};
use crate::ports::SeatStore;

use super::{seat_billing, AddSeatHandler, AddSeatResult, SeatCounter};

#[derive(Debug, Clone)]
pub struct ReactivateSeatCommand {
    pub account_id: AccountId,
    pub candidate_id: CandidateId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactivateSeatResult {
    pub seat: Seat,
    pub seat_count: u32,
    /// The charge that will restore the seat once paid. `None` when the
    /// seat was already active.
    pub purchase: Option<AddSeatResult>,
}

pub struct ReactivateSeatHandler {
    writer: AccountWriter,
    seats: Arc<dyn SeatStore>,
    seat_counter: SeatCounter,
    purchases: AddSeatHandler,
}

impl ReactivateSeatHandler {
    pub fn new(
        writer: AccountWriter,
        seats: Arc<dyn SeatStore>,
        seat_counter: SeatCounter,
        purchases: AddSeatHandler,
    ) -> Self {
        Self {
            writer,
            seats,
            seat_counter,
            purchases,
        }
    }

    /// Starts a new charge for the seat on the account's card on file.
    ///
    /// # Errors
    ///
    /// - `NotLinked` if the seat was removed or belongs elsewhere
    /// - `Validation` if the primary plan is not active
    /// - `GatewayUnavailable` if the new charge could not be created
    pub async fn handle(
        &self,
        cmd: ReactivateSeatCommand,
    ) -> Result<ReactivateSeatResult, BillingError> {
        let seat =
            seat_billing::find_account_seat(self.seats.as_ref(), cmd.account_id, &cmd.candidate_id)
                .await?;
        if seat.billing == SeatBilling::Active {
            let account = self.seat_counter.recount(cmd.account_id).await?;
            return Ok(ReactivateSeatResult {
                seat,
                seat_count: account.seat_count,
                purchase: None,
            });
        }

        let account = self
            .writer
            .store()
            .find_by_id(&cmd.account_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Account", cmd.account_id))?;
        let customer_id = seat_billing::seat_customer(&account)?;

        let candidate = SeatCandidate {
            candidate_id: seat.candidate_id.clone(),
            email: seat.email.clone(),
            name: seat.name.clone(),
        };
        let purchase = self
            .purchases
            .purchase(cmd.account_id, &customer_id, candidate, BillingMethod::CreditCard)
            .await?;

        tracing::info!(
            account_id = %cmd.account_id,
            candidate_id = %cmd.candidate_id,
            pending_seat_id = %purchase.pending_seat_id,
            coalesced = purchase.coalesced,
            "Seat reactivation awaiting payment"
        );
        Ok(ReactivateSeatResult {
            seat,
            seat_count: account.seat_count,
            purchase: Some(purchase),
        })
    }
}
