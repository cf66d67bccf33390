//! AddSeatHandler - starts a seat purchase.
//!
//! Reserves a pending seat for (account, candidate email), then creates the
//! seat's own recurring charge on the account's gateway customer. The seat
//! itself only exists once the payment webhook promotes the reservation.
//!
//! The gateway may deliver the paid webhook before `create_subscription`
//! returns here. Attaching the charge therefore happens under the account
//! lock, and a reservation already promoted with this very charge counts
//! as a successful purchase.

use std::sync::Arc;

use serde::Serialize;

use crate::application::account_writer::AccountWriter;
use crate::domain::billing::{BillingError, BillingMethod, PendingSeat, Pricing, SeatCandidate};
use crate::domain::foundation::{AccountId, PendingSeatId, Timestamp};
use crate::ports::{GatewayClient, ReserveOutcome, SeatStore};

use super::seat_billing;

#[derive(Debug, Clone)]
pub struct AddSeatCommand {
    pub account_id: AccountId,
    pub candidate: SeatCandidate,
    pub billing_method: BillingMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddSeatResult {
    pub pending_seat_id: PendingSeatId,
    pub external_payment_id: String,
    pub external_subscription_id: Option<String>,
    pub checkout_url: Option<String>,
    /// True when an earlier identical request already created the charge.
    pub coalesced: bool,
}

pub struct AddSeatHandler {
    writer: AccountWriter,
    seats: Arc<dyn SeatStore>,
    gateway: Arc<dyn GatewayClient>,
    pricing: Pricing,
    pending_ttl_minutes: i64,
}

impl AddSeatHandler {
    pub fn new(
        writer: AccountWriter,
        seats: Arc<dyn SeatStore>,
        gateway: Arc<dyn GatewayClient>,
        pricing: Pricing,
        pending_ttl_minutes: i64,
    ) -> Self {
        Self {
            writer,
            seats,
            gateway,
            pricing,
            pending_ttl_minutes,
        }
    }

    pub async fn handle(&self, cmd: AddSeatCommand) -> Result<AddSeatResult, BillingError> {
        let account = self
            .writer
            .store()
            .find_by_id(&cmd.account_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Account", cmd.account_id))?;
        let customer_id = seat_billing::seat_customer(&account)?;

        if let Some(seat) = self
            .seats
            .find_seat_by_candidate(&cmd.candidate.candidate_id)
            .await?
        {
            if seat.is_linked() {
                return Err(BillingError::already_linked(&seat.candidate_id));
            }
        }

        self.purchase(cmd.account_id, &customer_id, cmd.candidate, cmd.billing_method)
            .await
    }

    /// Reserves the candidate and creates the seat charge.
    ///
    /// Callers have already checked the account may buy seats and that the
    /// candidate is free for this account.
    pub(super) async fn purchase(
        &self,
        account_id: AccountId,
        customer_id: &str,
        candidate: SeatCandidate,
        billing_method: BillingMethod,
    ) -> Result<AddSeatResult, BillingError> {
        let pending = PendingSeat::reserve(
            account_id,
            candidate,
            billing_method,
            self.pending_ttl_minutes,
        );
        if let Some(existing) = self.reserve(&pending).await? {
            return self.coalesce(existing).await;
        }

        let subscription = match seat_billing::create_seat_subscription(
            self.gateway.as_ref(),
            self.pricing,
            customer_id,
            &pending.candidate,
            billing_method,
            pending.external_reference(),
        )
        .await
        {
            Ok(subscription) => subscription,
            Err(e) => {
                self.release(&pending).await;
                return Err(e.into());
            }
        };

        let payment_id = match &subscription.first_payment_id {
            Some(id) => Some(id.clone()),
            None => self
                .gateway
                .list_subscription_payments(&subscription.id)
                .await
                .ok()
                .and_then(|payments| payments.into_iter().next().map(|p| p.id)),
        };
        let Some(payment_id) = payment_id else {
            seat_billing::cancel_best_effort(self.gateway.as_ref(), &subscription.id).await;
            self.release(&pending).await;
            return Err(BillingError::inconsistent(format!(
                "gateway subscription {} has no charge",
                subscription.id
            )));
        };

        self.attach(&pending, &payment_id, &subscription.id).await?;

        tracing::info!(
            account_id = %account_id,
            candidate_id = %pending.candidate.candidate_id,
            pending_seat_id = %pending.id,
            payment_id = %payment_id,
            "Seat purchase started"
        );

        Ok(AddSeatResult {
            pending_seat_id: pending.id,
            external_payment_id: payment_id,
            external_subscription_id: Some(subscription.id),
            checkout_url: subscription.checkout_url,
            coalesced: false,
        })
    }

    /// Stores the new charge on the reservation.
    ///
    /// Runs under the account lock so it cannot interleave with the payment
    /// webhook or a cancellation. When the reservation is gone the charge is
    /// kept only if the webhook already promoted the seat with it.
    async fn attach(
        &self,
        pending: &PendingSeat,
        payment_id: &str,
        subscription_id: &str,
    ) -> Result<(), BillingError> {
        let guard = self.writer.locks().lock(pending.account_id).await;

        let stored = match self.seats.find_pending(&pending.id).await {
            Ok(stored) => stored,
            Err(e) => {
                drop(guard);
                seat_billing::cancel_best_effort(self.gateway.as_ref(), subscription_id).await;
                return Err(e.into());
            }
        };

        if let Some(mut current) = stored {
            current.attach_payment(payment_id.to_string(), Some(subscription_id.to_string()));
            if let Err(e) = self.seats.update_pending(&current).await {
                drop(guard);
                seat_billing::cancel_best_effort(self.gateway.as_ref(), subscription_id).await;
                return Err(e.into());
            }
            return Ok(());
        }

        let promoted = self
            .seats
            .find_seat_by_candidate(&pending.candidate.candidate_id)
            .await?
            .is_some_and(|seat| {
                seat.is_billed_to(&pending.account_id)
                    && seat.external_subscription_id.as_deref() == Some(subscription_id)
            });
        drop(guard);

        if promoted {
            tracing::info!(
                account_id = %pending.account_id,
                pending_seat_id = %pending.id,
                subscription_id = %subscription_id,
                "Seat paid before its charge was attached"
            );
            return Ok(());
        }

        // Cancelled while the charge was being created.
        seat_billing::cancel_best_effort(self.gateway.as_ref(), subscription_id).await;
        Err(BillingError::not_found("PendingSeat", pending.id))
    }

    /// Reserves the slot. Returns the blocking reservation when one exists.
    ///
    /// An expired unpaid reservation is replaced once.
    async fn reserve(&self, pending: &PendingSeat) -> Result<Option<PendingSeat>, BillingError> {
        let mut replaced = false;
        loop {
            match self.seats.reserve_pending(pending).await? {
                ReserveOutcome::Inserted => return Ok(None),
                ReserveOutcome::Existing(existing)
                    if !replaced && existing.is_expired(Timestamp::now()) =>
                {
                    self.replace_expired(existing).await?;
                    replaced = true;
                }
                ReserveOutcome::Existing(existing) => return Ok(Some(existing)),
            }
        }
    }

    async fn replace_expired(&self, existing: PendingSeat) -> Result<(), BillingError> {
        let guard = self.writer.locks().lock(existing.account_id).await;
        // A payment may have landed since the reservation was read.
        let still_expired = self
            .seats
            .find_pending(&existing.id)
            .await?
            .is_some_and(|current| current.is_expired(Timestamp::now()));
        if !still_expired {
            return Ok(());
        }

        tracing::info!(
            account_id = %existing.account_id,
            pending_seat_id = %existing.id,
            "Replacing expired seat reservation"
        );
        self.seats.delete_pending(&existing.id).await?;
        drop(guard);

        if let Some(subscription_id) = &existing.external_subscription_id {
            seat_billing::cancel_best_effort(self.gateway.as_ref(), subscription_id).await;
        }
        Ok(())
    }

    async fn coalesce(&self, existing: PendingSeat) -> Result<AddSeatResult, BillingError> {
        let Some(payment_id) = existing.external_payment_id.clone() else {
            return Err(BillingError::already_linked(&existing.candidate.candidate_id));
        };

        let checkout_url = match &existing.external_subscription_id {
            Some(subscription_id) => match self.gateway.get_subscription(subscription_id).await {
                Ok(subscription) => subscription.and_then(|s| s.checkout_url),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not fetch checkout link for coalesced seat");
                    None
                }
            },
            None => None,
        };

        tracing::debug!(
            account_id = %existing.account_id,
            pending_seat_id = %existing.id,
            "Coalesced duplicate seat request"
        );
        Ok(AddSeatResult {
            pending_seat_id: existing.id,
            external_payment_id: payment_id,
            external_subscription_id: existing.external_subscription_id,
            checkout_url,
            coalesced: true,
        })
    }

    async fn release(&self, pending: &PendingSeat) {
        if let Err(e) = self.seats.delete_pending(&pending.id).await {
            tracing::error!(
                pending_seat_id = %pending.id,
                error = %e,
                "Failed to release seat reservation"
            );
        }
    }
}
