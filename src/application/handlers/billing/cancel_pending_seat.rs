//! CancelPendingSeatHandler - abandons a seat purchase that was never paid.
//!
//! The paid check and the delete happen under the account lock, the same
//! lock the payment webhook promotes under, so a payment landing mid-cancel
//! is either seen here or finds the reservation already gone.

use std::sync::Arc;

use serde::Serialize;

use crate::application::account_writer::AccountLocks;
use crate::domain::billing::BillingError;
use crate::domain::foundation::{AccountId, PendingSeatId};
use crate::ports::{GatewayClient, SeatStore};

use super::seat_billing;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelPendingSeatCommand {
    pub account_id: AccountId,
    /// Gateway payment id returned when the seat was requested.
    pub payment_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelPendingSeatResult {
    pub pending_seat_id: PendingSeatId,
    /// False when the payment already went through; the seat will be promoted.
    pub canceled: bool,
}

pub struct CancelPendingSeatHandler {
    locks: AccountLocks,
    seats: Arc<dyn SeatStore>,
    gateway: Arc<dyn GatewayClient>,
}

impl CancelPendingSeatHandler {
    pub fn new(locks: AccountLocks, seats: Arc<dyn SeatStore>, gateway: Arc<dyn GatewayClient>) -> Self {
        Self {
            locks,
            seats,
            gateway,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelPendingSeatCommand,
    ) -> Result<CancelPendingSeatResult, BillingError> {
        let found = self
            .seats
            .find_pending_by_payment(&cmd.payment_ref)
            .await?
            .filter(|p| p.account_id == cmd.account_id)
            .ok_or_else(|| BillingError::not_found("PendingSeat", &cmd.payment_ref))?;

        let guard = self.locks.lock(cmd.account_id).await;
        let pending = self
            .seats
            .find_pending(&found.id)
            .await?
            .ok_or_else(|| BillingError::not_found("PendingSeat", &cmd.payment_ref))?;

        if pending.is_paid() {
            return Ok(CancelPendingSeatResult {
                pending_seat_id: pending.id,
                canceled: false,
            });
        }

        let deleted = self.seats.delete_pending(&pending.id).await?;
        drop(guard);

        if let Some(subscription_id) = &pending.external_subscription_id {
            seat_billing::cancel_best_effort(self.gateway.as_ref(), subscription_id).await;
        }

        tracing::info!(
            account_id = %cmd.account_id,
            pending_seat_id = %pending.id,
            payment_ref = %cmd.payment_ref,
            deleted,
            "Pending seat canceled"
        );
        Ok(CancelPendingSeatResult {
            pending_seat_id: pending.id,
            canceled: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::billing::test_support::{candidate, Fixture};
    use crate::domain::billing::{BillingMethod, PaymentStatus, PendingSeat};

    async fn reserved(fixture: &Fixture, account_id: AccountId) -> PendingSeat {
        let mut pending = PendingSeat::reserve(account_id, candidate(1), BillingMethod::InstantTransfer, 30);
        pending.attach_payment("pay_seat".to_string(), Some("sub_seat".to_string()));
        fixture.seats.reserve_pending(&pending).await.unwrap();
        pending
    }

    fn handler(fixture: &Fixture) -> CancelPendingSeatHandler {
        CancelPendingSeatHandler::new(
            fixture.locks.clone(),
            fixture.seats.clone(),
            fixture.gateway.clone(),
        )
    }

    fn command(account_id: AccountId) -> CancelPendingSeatCommand {
        CancelPendingSeatCommand {
            account_id,
            payment_ref: "pay_seat".to_string(),
        }
    }

    #[tokio::test]
    async fn cancels_pending_seat_and_upstream_charge() {
        let fixture = Fixture::new();
        let account = fixture.primary_account().await;
        let pending = reserved(&fixture, account.id).await;

        let result = handler(&fixture).handle(command(account.id)).await.unwrap();

        assert!(result.canceled);
        assert!(fixture.seats.find_pending(&pending.id).await.unwrap().is_none());
        assert!(fixture.gateway.was_called("cancel_subscription"));
    }

    #[tokio::test]
    async fn paid_seat_is_not_canceled() {
        let fixture = Fixture::new();
        let account = fixture.primary_account().await;
        let mut pending = reserved(&fixture, account.id).await;
        pending.payment_status = Some(PaymentStatus::Received);
        fixture.seats.update_pending(&pending).await.unwrap();

        let result = handler(&fixture).handle(command(account.id)).await.unwrap();

        assert!(!result.canceled);
        assert!(fixture.seats.find_pending(&pending.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn payment_landing_while_waiting_for_the_lock_wins() {
        let fixture = Fixture::new();
        let account = fixture.primary_account().await;
        let mut pending = reserved(&fixture, account.id).await;
        let handler = Arc::new(handler(&fixture));

        let guard = fixture.locks.lock(account.id).await;
        let cancel = tokio::spawn({
            let handler = handler.clone();
            async move { handler.handle(command(account.id)).await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        pending.payment_status = Some(PaymentStatus::Confirmed);
        fixture.seats.update_pending(&pending).await.unwrap();
        drop(guard);

        let result = cancel.await.unwrap().unwrap();

        assert!(!result.canceled);
        assert!(fixture.seats.find_pending(&pending.id).await.unwrap().is_some());
        assert!(!fixture.gateway.was_called("cancel_subscription"));
    }

    #[tokio::test]
    async fn reservation_resolved_while_waiting_is_not_found() {
        let fixture = Fixture::new();
        let account = fixture.primary_account().await;
        let pending = reserved(&fixture, account.id).await;
        let handler = Arc::new(handler(&fixture));

        let guard = fixture.locks.lock(account.id).await;
        let cancel = tokio::spawn({
            let handler = handler.clone();
            async move { handler.handle(command(account.id)).await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        fixture.seats.delete_pending(&pending.id).await.unwrap();
        drop(guard);

        let err = cancel.await.unwrap().unwrap_err();

        assert!(matches!(err, BillingError::NotFound { .. }));
        assert!(!fixture.gateway.was_called("cancel_subscription"));
    }

    #[tokio::test]
    async fn other_accounts_pending_seat_is_not_found() {
        let fixture = Fixture::new();
        let owner = fixture.primary_account().await;
        let stranger = fixture.primary_account().await;
        reserved(&fixture, owner.id).await;

        let err = handler(&fixture).handle(command(stranger.id)).await.unwrap_err();

        assert!(matches!(err, BillingError::NotFound { .. }));
        assert_eq!(fixture.seats.pending_count().await, 1);
    }
}
