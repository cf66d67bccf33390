//! ReconcileWebhookHandler - applies gateway webhook events to local state.
//!
//! Every structurally valid event produces a [`ReconciliationResult`]; only
//! a malformed envelope is an error. Unknown accounts are `Deferred` (the
//! account is about to be created by registration), failures inside a
//! branch are logged and reported as `Failed`, never propagated, so the
//! gateway is not pushed into a retry storm.
//!
//! Each transition is a pure function of current state and event content,
//! so redelivery is harmless with or without the event ledger. Events for a
//! subscription other than the one linked to the account change nothing.
//!
//! # Routing
//!
//! ```text
//! payment event ──┬─ seat reference / pending seat match ──> seat promotion
//!                 ├─ seat subscription match ──────────────> seat suspension
//!                 ├─ seat reference, nothing left ─────────> failed if paid
//!                 └─ subscription → customer → reference ──> account status
//!
//! subscription ───┬─ seat subscription match ──────────────> seat suspension
//! event           ├─ pending seat match ───────────────────> ignored
//!                 └─ subscription → customer → reference ──> account status
//! ```

use std::sync::Arc;

use serde::Serialize;

use crate::application::account_writer::{AccountGuard, AccountWriter};
use crate::domain::billing::{
    Account, BillingError, PaymentEvent, PaymentPayload, PendingSeat, Seat, SeatBilling,
    SubscriptionEvent, SubscriptionStatus, TransitionOutcome, WebhookBody, WebhookEvent,
};
use crate::domain::foundation::{AccountId, Email, Timestamp};
use crate::ports::{PaymentNotifier, ProcessedEventLedger, SeatStore};

use super::SeatCounter;

#[derive(Debug, Clone)]
pub struct ReconcileWebhookCommand {
    pub body: Vec<u8>,
    pub received_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconciliationResult {
    /// The account's status moved.
    Applied {
        account_id: AccountId,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },
    /// Event matched an account but changed no status.
    Unchanged { account_id: AccountId },
    /// No account yet. Registration will create it.
    Deferred { reason: String },
    /// Illegal, stale or unsupported. Logged, not applied.
    Ignored { reason: String },
    /// The event id was already processed.
    Duplicate { event_id: String },
    SeatPromoted {
        account_id: AccountId,
        candidate_id: String,
        seat_count: u32,
    },
    SeatSuspended {
        account_id: AccountId,
        candidate_id: String,
        seat_count: u32,
    },
    /// Processing failed. Logged for operators; still acknowledged.
    Failed { reason: String },
}

impl ReconciliationResult {
    fn ignored(reason: impl Into<String>) -> Self {
        Self::Ignored {
            reason: reason.into(),
        }
    }

    /// Results worth recording in the event ledger.
    fn is_final(&self) -> bool {
        !matches!(
            self,
            Self::Deferred { .. } | Self::Failed { .. } | Self::Duplicate { .. }
        )
    }
}

pub struct ReconcileWebhookHandler {
    writer: AccountWriter,
    seats: Arc<dyn SeatStore>,
    seat_counter: SeatCounter,
    notifier: Option<Arc<dyn PaymentNotifier>>,
    ledger: Option<Arc<dyn ProcessedEventLedger>>,
}

impl ReconcileWebhookHandler {
    pub fn new(writer: AccountWriter, seats: Arc<dyn SeatStore>, seat_counter: SeatCounter) -> Self {
        Self {
            writer,
            seats,
            seat_counter,
            notifier: None,
            ledger: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn PaymentNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn ProcessedEventLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Parses and processes a raw webhook body.
    ///
    /// # Errors
    ///
    /// `BillingError::Validation` when the envelope is structurally invalid.
    pub async fn handle(
        &self,
        cmd: ReconcileWebhookCommand,
    ) -> Result<ReconciliationResult, BillingError> {
        let event = WebhookEvent::parse(&cmd.body, cmd.received_at).map_err(|e| {
            tracing::warn!(error = %e, "Rejected malformed webhook");
            BillingError::from(e)
        })?;
        Ok(self.process(event).await)
    }

    /// Processes a parsed event. Never fails.
    pub async fn process(&self, event: WebhookEvent) -> ReconciliationResult {
        if let Some(duplicate) = self.check_ledger(&event).await {
            return duplicate;
        }

        let outcome = match &event.body {
            WebhookBody::Payment(payment) => self.on_payment(&event, payment).await,
            WebhookBody::Subscription(subscription) => {
                self.on_subscription(&event, subscription).await
            }
            WebhookBody::Unsupported => {
                tracing::debug!(event_kind = %event.event_kind, "Unsupported webhook kind");
                Ok(ReconciliationResult::ignored(format!(
                    "unsupported event kind {}",
                    event.event_kind
                )))
            }
        };

        let result = outcome.unwrap_or_else(|error| {
            match &error {
                BillingError::Inconsistent(_) => tracing::error!(
                    event_kind = %event.event_kind,
                    event_id = ?event.event_id,
                    error = %error,
                    "Webhook reconciliation left billing state inconsistent"
                ),
                _ => tracing::error!(
                    event_kind = %event.event_kind,
                    event_id = ?event.event_id,
                    error = %error,
                    "Webhook reconciliation failed"
                ),
            }
            ReconciliationResult::Failed {
                reason: error.to_string(),
            }
        });

        if result.is_final() {
            self.record_in_ledger(&event).await;
        }
        result
    }

    async fn check_ledger(&self, event: &WebhookEvent) -> Option<ReconciliationResult> {
        let (ledger, event_id) = (self.ledger.as_ref()?, event.event_id.as_ref()?);
        match ledger.contains(event_id).await {
            Ok(true) => {
                tracing::debug!(event_id = %event_id, "Duplicate webhook delivery");
                Some(ReconciliationResult::Duplicate {
                    event_id: event_id.clone(),
                })
            }
            Ok(false) => None,
            Err(e) => {
                tracing::warn!(event_id = %event_id, error = %e, "Event ledger lookup failed");
                None
            }
        }
    }

    async fn record_in_ledger(&self, event: &WebhookEvent) {
        if let (Some(ledger), Some(event_id)) = (&self.ledger, &event.event_id) {
            if let Err(e) = ledger.mark_processed(event_id).await {
                tracing::warn!(event_id = %event_id, error = %e, "Event ledger write failed");
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Payment events
    // ════════════════════════════════════════════════════════════════════════

    async fn on_payment(
        &self,
        event: &WebhookEvent,
        payment: &PaymentEvent,
    ) -> Result<ReconciliationResult, BillingError> {
        let payload = &payment.payload;

        if let Some(pending) = self.find_pending_for_payment(payload).await? {
            return self.on_seat_payment(payment, pending).await;
        }
        if let Some(seat) = self.find_seat_for_payment(payload).await? {
            return self.on_seat_subscription_payment(payment, seat).await;
        }
        if is_seat_reference(payload.external_reference.as_deref()) {
            return orphan_seat_payment(payment);
        }

        let Some(account) = self.resolve_payment_account(payload).await? else {
            tracing::info!(
                event_kind = %event.event_kind,
                payment_id = %payload.id,
                customer_ref = %payload.customer_ref,
                "No account for payment yet; deferring"
            );
            return Ok(ReconciliationResult::Deferred {
                reason: format!("no account for customer {}", payload.customer_ref),
            });
        };

        let status = payment.effective_status();
        let target = if payment.is_paid() {
            Some(SubscriptionStatus::Active)
        } else if payment.is_overdue() {
            Some(SubscriptionStatus::PastDue)
        } else {
            None
        };
        let subscription_ref = payload.subscription_ref.clone();
        let customer_ref = payload.customer_ref.clone();

        let modified = self
            .writer
            .modify(account.id, |account| {
                if let Some(subscription_id) = &subscription_ref {
                    if !account.link_subscription(subscription_id) {
                        return None;
                    }
                }
                account.record_payment_status(status.clone());
                account.link_customer(&customer_ref);
                Some(target.map(|target| {
                    account.reconcile_status(target, event.occurred_at, event.received_at)
                }))
            })
            .await?;

        let Some(outcome) = modified.value else {
            tracing::warn!(
                account_id = %account.id,
                payment_id = %payload.id,
                subscription_id = ?subscription_ref,
                linked = ?modified.account.external_subscription_id,
                "Payment for a subscription not linked to the account"
            );
            return Ok(ReconciliationResult::ignored(
                "subscription is not the account's linked subscription",
            ));
        };
        let Some(outcome) = outcome else {
            tracing::info!(
                account_id = %account.id,
                payment_status = %status,
                "Payment status recorded"
            );
            return Ok(ReconciliationResult::Unchanged {
                account_id: account.id,
            });
        };

        let result = self.outcome_result(event, &modified.account, outcome);
        if payment.is_paid() && outcome.is_changed() {
            self.notify_payment_confirmed(modified.account);
        }
        Ok(result)
    }

    async fn find_pending_for_payment(
        &self,
        payload: &PaymentPayload,
    ) -> Result<Option<PendingSeat>, BillingError> {
        if let Some(id) = payload
            .external_reference
            .as_deref()
            .and_then(PendingSeat::parse_reference)
        {
            if let Some(pending) = self.seats.find_pending(&id).await? {
                return Ok(Some(pending));
            }
        }
        if let Some(pending) = self.seats.find_pending_by_payment(&payload.id).await? {
            return Ok(Some(pending));
        }
        match &payload.subscription_ref {
            Some(subscription_id) => Ok(self
                .seats
                .find_pending_by_subscription(subscription_id)
                .await?),
            None => Ok(None),
        }
    }

    async fn find_seat_for_payment(
        &self,
        payload: &PaymentPayload,
    ) -> Result<Option<Seat>, BillingError> {
        match &payload.subscription_ref {
            Some(subscription_id) => Ok(self.seats.find_seat_by_subscription(subscription_id).await?),
            None => Ok(None),
        }
    }

    async fn resolve_payment_account(
        &self,
        payload: &PaymentPayload,
    ) -> Result<Option<Account>, BillingError> {
        let store = self.writer.store();
        if let Some(subscription_id) = &payload.subscription_ref {
            if let Some(account) = store.find_by_subscription_id(subscription_id).await? {
                return Ok(Some(account));
            }
        }
        if let Some(account) = store.find_by_customer_id(&payload.customer_ref).await? {
            return Ok(Some(account));
        }
        self.resolve_reference(payload.external_reference.as_deref())
            .await
    }

    /// Last-resort lookup: the reference carries an account id or an e-mail.
    async fn resolve_reference(
        &self,
        reference: Option<&str>,
    ) -> Result<Option<Account>, BillingError> {
        let Some(reference) = reference.map(str::trim).filter(|r| !r.is_empty()) else {
            return Ok(None);
        };
        let store = self.writer.store();
        if let Ok(account_id) = reference.parse::<AccountId>() {
            return Ok(store.find_by_id(&account_id).await?);
        }
        match Email::parse(reference) {
            Ok(email) => Ok(store.find_by_email(&email).await?),
            Err(_) => Ok(None),
        }
    }

    async fn on_seat_payment(
        &self,
        payment: &PaymentEvent,
        pending: PendingSeat,
    ) -> Result<ReconciliationResult, BillingError> {
        let payload = &payment.payload;
        let guard = self.writer.locks().lock(pending.account_id).await;

        // Re-read under the lock; the purchase, a cancellation or another
        // delivery may have moved the reservation since it was matched.
        let Some(mut pending) = self.seats.find_pending(&pending.id).await? else {
            drop(guard);
            return match self.find_seat_for_payment(payload).await? {
                Some(seat) => self.on_seat_subscription_payment(payment, seat).await,
                None => orphan_seat_payment(payment),
            };
        };

        let status = payment.effective_status();
        pending.record_payment(&payload.id, payload.subscription_ref.as_deref(), status.clone());

        if !pending.is_paid() {
            self.seats.update_pending(&pending).await?;
            tracing::info!(
                account_id = %pending.account_id,
                candidate_id = %pending.candidate.candidate_id.as_str(),
                payment_status = %status,
                "Seat payment status recorded"
            );
            return Ok(ReconciliationResult::Unchanged {
                account_id: pending.account_id,
            });
        }

        self.promote(&guard, pending).await
    }

    /// Turns a paid pending seat into a seat. Exactly one seat or one
    /// `Inconsistent` error; the pending record is kept in the error case.
    async fn promote(
        &self,
        guard: &AccountGuard,
        pending: PendingSeat,
    ) -> Result<ReconciliationResult, BillingError> {
        let account_id = pending.account_id;
        let candidate_id = pending.candidate.candidate_id.clone();

        let seat = match self.seats.find_seat_by_candidate(&candidate_id).await? {
            None => Seat::promote(
                account_id,
                pending.candidate.clone(),
                pending.external_subscription_id.clone(),
            ),
            Some(seat) if seat.is_linked() && seat.account_id != Some(account_id) => {
                return Err(BillingError::inconsistent(format!(
                    "paid seat for candidate {} but the candidate is linked to another account",
                    candidate_id.as_str()
                )));
            }
            Some(mut seat) if seat.billing == SeatBilling::Removed => {
                seat.relink(account_id, pending.external_subscription_id.clone())?;
                seat
            }
            Some(mut seat) if seat.billing == SeatBilling::Suspended => {
                let subscription_id = pending
                    .external_subscription_id
                    .clone()
                    .or_else(|| seat.external_subscription_id.clone())
                    .unwrap_or_default();
                seat.reactivate(subscription_id)?;
                seat
            }
            // Already promoted by an earlier delivery.
            Some(seat) => seat,
        };

        self.seats.save_seat(&seat).await?;
        self.seats.delete_pending(&pending.id).await?;
        let account = self
            .seat_counter
            .recount_held(guard, account_id)
            .await?;

        tracing::info!(
            account_id = %account_id,
            candidate_id = %candidate_id.as_str(),
            seat_count = account.seat_count,
            "Seat promoted"
        );
        Ok(ReconciliationResult::SeatPromoted {
            account_id,
            candidate_id: candidate_id.as_str().to_string(),
            seat_count: account.seat_count,
        })
    }

    // ════════════════════════════════════════════════════════════════════════
    // Subscription events
    // ════════════════════════════════════════════════════════════════════════

    async fn on_subscription(
        &self,
        event: &WebhookEvent,
        subscription: &SubscriptionEvent,
    ) -> Result<ReconciliationResult, BillingError> {
        let payload = &subscription.payload;

        if let Some(seat) = self.seats.find_seat_by_subscription(&payload.id).await? {
            return self.on_seat_subscription(subscription, seat).await;
        }
        if is_seat_reference(payload.external_reference.as_deref())
            || self
                .seats
                .find_pending_by_subscription(&payload.id)
                .await?
                .is_some()
        {
            tracing::debug!(subscription_id = %payload.id, "Subscription event for a pending seat");
            return Ok(ReconciliationResult::ignored("pending seat subscription"));
        }

        let Some(target) = subscription.target_status() else {
            tracing::warn!(
                subscription_id = %payload.id,
                gateway_status = %payload.status,
                "Subscription update with unmapped status"
            );
            return Ok(ReconciliationResult::ignored(format!(
                "unmapped subscription status {}",
                payload.status
            )));
        };

        let store = self.writer.store();
        let account = match store.find_by_subscription_id(&payload.id).await? {
            Some(account) => Some(account),
            None => match store.find_by_customer_id(&payload.customer_ref).await? {
                Some(account) => Some(account),
                None => {
                    self.resolve_reference(payload.external_reference.as_deref())
                        .await?
                }
            },
        };
        let Some(account) = account else {
            tracing::info!(
                event_kind = %event.event_kind,
                subscription_id = %payload.id,
                "No account for subscription yet; deferring"
            );
            return Ok(ReconciliationResult::Deferred {
                reason: format!("no account for subscription {}", payload.id),
            });
        };

        let subscription_id = payload.id.clone();
        let customer_ref = payload.customer_ref.clone();
        let modified = self
            .writer
            .modify(account.id, |account| {
                if !account.link_subscription(&subscription_id) {
                    return None;
                }
                account.link_customer(&customer_ref);
                Some(account.reconcile_status(target, event.occurred_at, event.received_at))
            })
            .await?;

        match modified.value {
            Some(outcome) => Ok(self.outcome_result(event, &modified.account, outcome)),
            None => {
                tracing::warn!(
                    account_id = %account.id,
                    subscription_id = %subscription_id,
                    linked = ?modified.account.external_subscription_id,
                    "Subscription event for a subscription not linked to the account"
                );
                Ok(ReconciliationResult::ignored(
                    "subscription is not the account's linked subscription",
                ))
            }
        }
    }

    async fn on_seat_subscription(
        &self,
        subscription: &SubscriptionEvent,
        seat: Seat,
    ) -> Result<ReconciliationResult, BillingError> {
        let Some(account_id) = seat.account_id else {
            return Ok(ReconciliationResult::ignored("seat already removed"));
        };
        if !subscription.kind.ends_billing() || seat.billing != SeatBilling::Active {
            return Ok(ReconciliationResult::Unchanged { account_id });
        }
        self.suspend_seat(account_id, seat, "subscription ended").await
    }

    /// A payment on a seat's own subscription. Paid charges keep the seat
    /// as it is; a suspended seat comes back through reactivation.
    async fn on_seat_subscription_payment(
        &self,
        payment: &PaymentEvent,
        seat: Seat,
    ) -> Result<ReconciliationResult, BillingError> {
        let Some(account_id) = seat.account_id else {
            return Ok(ReconciliationResult::ignored("seat already removed"));
        };
        if !payment.withdraws_payment() || seat.billing != SeatBilling::Active {
            tracing::debug!(
                candidate_id = %seat.candidate_id.as_str(),
                payment_id = %payment.payload.id,
                "Seat subscription payment leaves the seat as is"
            );
            return Ok(ReconciliationResult::Unchanged { account_id });
        }
        self.suspend_seat(account_id, seat, "payment withdrawn").await
    }

    async fn suspend_seat(
        &self,
        account_id: AccountId,
        seat: Seat,
        cause: &'static str,
    ) -> Result<ReconciliationResult, BillingError> {
        let guard = self.writer.locks().lock(account_id).await;
        // Re-read under the lock; a concurrent removal or reactivation may have won.
        let Some(mut current) = self.seats.find_seat_by_candidate(&seat.candidate_id).await? else {
            return Err(BillingError::inconsistent(format!(
                "seat for candidate {} disappeared",
                seat.candidate_id.as_str()
            )));
        };
        if current.billing != SeatBilling::Active
            || current.account_id != Some(account_id)
            || current.external_subscription_id != seat.external_subscription_id
        {
            return Ok(ReconciliationResult::Unchanged { account_id });
        }

        current.suspend()?;
        self.seats.save_seat(&current).await?;
        let account = self
            .seat_counter
            .recount_held(&guard, account_id)
            .await?;

        tracing::info!(
            account_id = %account_id,
            candidate_id = %current.candidate_id.as_str(),
            cause = %cause,
            seat_count = account.seat_count,
            "Seat suspended by gateway"
        );
        Ok(ReconciliationResult::SeatSuspended {
            account_id,
            candidate_id: current.candidate_id.as_str().to_string(),
            seat_count: account.seat_count,
        })
    }

    // ════════════════════════════════════════════════════════════════════════
    // Shared
    // ════════════════════════════════════════════════════════════════════════

    fn outcome_result(
        &self,
        event: &WebhookEvent,
        account: &Account,
        outcome: TransitionOutcome,
    ) -> ReconciliationResult {
        match outcome {
            TransitionOutcome::Changed { from, to } => {
                tracing::info!(
                    account_id = %account.id,
                    event_kind = %event.event_kind,
                    from = %from,
                    to = %to,
                    "Subscription status reconciled"
                );
                ReconciliationResult::Applied {
                    account_id: account.id,
                    from,
                    to,
                }
            }
            TransitionOutcome::Unchanged => ReconciliationResult::Unchanged {
                account_id: account.id,
            },
            TransitionOutcome::Illegal { from, to } => {
                tracing::warn!(
                    account_id = %account.id,
                    event_kind = %event.event_kind,
                    from = %from,
                    to = %to,
                    "Ignoring illegal status transition"
                );
                ReconciliationResult::ignored(format!("illegal transition {} -> {}", from, to))
            }
            TransitionOutcome::Held { from, to } => {
                tracing::info!(
                    account_id = %account.id,
                    event_kind = %event.event_kind,
                    from = %from,
                    to = %to,
                    "Holding status transition until earlier events arrive"
                );
                ReconciliationResult::ignored(format!(
                    "transition {} -> {} held until earlier events arrive",
                    from, to
                ))
            }
            TransitionOutcome::Stale {
                event_time,
                status_changed_at,
            } => {
                tracing::warn!(
                    account_id = %account.id,
                    event_kind = %event.event_kind,
                    event_time = %event_time.as_datetime(),
                    status_changed_at = %status_changed_at.as_datetime(),
                    "Ignoring stale event"
                );
                ReconciliationResult::ignored("event older than current status")
            }
        }
    }

    fn notify_payment_confirmed(&self, account: Account) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = notifier.payment_confirmed(&account).await {
                tracing::warn!(account_id = %account.id, error = %e, "Payment confirmation notification failed");
            }
        });
    }
}

/// A seat payment whose reservation and seat are both gone. Money taken for
/// a seat nobody holds needs an operator.
fn orphan_seat_payment(payment: &PaymentEvent) -> Result<ReconciliationResult, BillingError> {
    let payload = &payment.payload;
    if payment.is_paid() {
        return Err(BillingError::inconsistent(format!(
            "payment {} was paid for seat reservation {} which no longer exists",
            payload.id,
            payload.external_reference.as_deref().unwrap_or("-")
        )));
    }
    tracing::info!(
        payment_id = %payload.id,
        reference = ?payload.external_reference,
        "Seat payment for a reservation that no longer exists"
    );
    Ok(ReconciliationResult::ignored("seat reservation already resolved"))
}

fn is_seat_reference(reference: Option<&str>) -> bool {
    reference
        .and_then(PendingSeat::parse_reference)
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryEventLedger;
    use crate::application::handlers::billing::test_support::{candidate, Fixture, RecordingNotifier};
    use crate::domain::billing::{BillingMethod, PaymentStatus};
    use crate::ports::AccountStore;
    use serde_json::json;

    fn handler(fixture: &Fixture) -> ReconcileWebhookHandler {
        ReconcileWebhookHandler::new(fixture.writer(), fixture.seats.clone(), fixture.seat_counter())
    }

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000 + secs).unwrap()
    }

    fn rfc3339(ts: Timestamp) -> String {
        ts.as_datetime().to_rfc3339()
    }

    fn payment(kind: &str, customer: &str, subscription: Option<&str>, occurred: Timestamp) -> Vec<u8> {
        json!({
            "eventKind": kind,
            "occurredAt": rfc3339(occurred),
            "payload": {
                "id": format!("pay_{}", kind),
                "customerRef": customer,
                "subscriptionRef": subscription,
                "status": "PENDING",
                "billingMethod": "CREDIT_CARD",
                "value": 49.9
            }
        })
        .to_string()
        .into_bytes()
    }

    fn subscription_event(
        kind: &str,
        id: &str,
        customer: &str,
        reference: Option<&str>,
        occurred: Option<Timestamp>,
    ) -> Vec<u8> {
        let mut body = json!({
            "eventKind": kind,
            "payload": {
                "id": id,
                "customerRef": customer,
                "status": "ACTIVE",
                "externalReference": reference
            }
        });
        if let Some(occurred) = occurred {
            body["occurredAt"] = json!(rfc3339(occurred));
        }
        body.to_string().into_bytes()
    }

    async fn run(handler: &ReconcileWebhookHandler, body: Vec<u8>) -> ReconciliationResult {
        handler
            .handle(ReconcileWebhookCommand {
                body,
                received_at: Timestamp::now(),
            })
            .await
            .unwrap()
    }

    async fn wait_for_notifications(notifier: &RecordingNotifier, expected: usize) {
        for _ in 0..100 {
            if notifier.notified().len() >= expected {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn activation_by_account_reference_sets_active_and_start_date() {
        let fixture = Fixture::new();
        let account = fixture.account().await;
        let handler = handler(&fixture);

        let result = run(
            &handler,
            subscription_event(
                "SUBSCRIPTION_ACTIVATED",
                "sub_1",
                "cus_1",
                Some(&account.id.to_string()),
                Some(at(100)),
            ),
        )
        .await;

        assert_eq!(
            result,
            ReconciliationResult::Applied {
                account_id: account.id,
                from: SubscriptionStatus::Trial,
                to: SubscriptionStatus::Active,
            }
        );
        let stored = fixture.stored(&account.id).await;
        assert_eq!(stored.status, SubscriptionStatus::Active);
        assert_eq!(stored.subscription_start, Some(at(100)));
        assert_eq!(stored.external_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(stored.external_customer_id.as_deref(), Some("cus_1"));
    }

    #[tokio::test]
    async fn overdue_payment_moves_active_to_past_due_keeping_seats() {
        let fixture = Fixture::new();
        let mut account = fixture.primary_account().await;
        account.seat_count = 2;
        fixture.accounts.update(&account).await.unwrap();
        let customer = account.external_customer_id.clone().unwrap();
        let subscription = account.external_subscription_id.clone();

        let result = run(
            &handler(&fixture),
            payment("PAYMENT_OVERDUE", &customer, subscription.as_deref(), at(200)),
        )
        .await;

        assert!(matches!(
            result,
            ReconciliationResult::Applied { to: SubscriptionStatus::PastDue, .. }
        ));
        let stored = fixture.stored(&account.id).await;
        assert_eq!(stored.status, SubscriptionStatus::PastDue);
        assert_eq!(stored.seat_count, 2);
        assert_eq!(stored.last_payment_status, Some(PaymentStatus::Overdue));
    }

    #[tokio::test]
    async fn confirmed_payment_twice_is_a_noop_the_second_time() {
        let fixture = Fixture::new();
        let mut account = fixture.account().await;
        account.external_customer_id = Some("cus_9".to_string());
        fixture.accounts.update(&account).await.unwrap();
        let handler = handler(&fixture);
        let body = payment("PAYMENT_CONFIRMED", "cus_9", Some("sub_9"), at(50));

        let first = run(&handler, body.clone()).await;
        let after_first = fixture.stored(&account.id).await;
        let second = run(&handler, body).await;
        let after_second = fixture.stored(&account.id).await;

        assert!(matches!(first, ReconciliationResult::Applied { .. }));
        assert_eq!(second, ReconciliationResult::Unchanged { account_id: account.id });
        assert_eq!(after_first, after_second);
        assert_eq!(after_second.subscription_start, Some(at(50)));
    }

    #[tokio::test]
    async fn unpaid_payment_only_records_status() {
        let fixture = Fixture::new();
        let mut account = fixture.account().await;
        account.external_customer_id = Some("cus_2".to_string());
        fixture.accounts.update(&account).await.unwrap();

        let result = run(&handler(&fixture), payment("PAYMENT_CREATED", "cus_2", None, at(1))).await;

        assert_eq!(result, ReconciliationResult::Unchanged { account_id: account.id });
        let stored = fixture.stored(&account.id).await;
        assert_eq!(stored.status, SubscriptionStatus::Trial);
        assert_eq!(stored.last_payment_status, Some(PaymentStatus::Pending));
    }

    #[tokio::test]
    async fn approved_bank_slip_is_not_paid() {
        let fixture = Fixture::new();
        let mut account = fixture.account().await;
        account.external_customer_id = Some("cus_3".to_string());
        fixture.accounts.update(&account).await.unwrap();
        let body = json!({
            "eventKind": "PAYMENT_APPROVED",
            "payload": {
                "id": "pay_slip",
                "customerRef": "cus_3",
                "status": "APPROVED",
                "billingMethod": "BOLETO",
                "value": 49.9
            }
        })
        .to_string()
        .into_bytes();

        run(&handler(&fixture), body).await;

        assert_eq!(fixture.stored(&account.id).await.status, SubscriptionStatus::Trial);
    }

    #[tokio::test]
    async fn unknown_account_is_deferred() {
        let fixture = Fixture::new();

        let result = run(
            &handler(&fixture),
            payment("PAYMENT_CONFIRMED", "cus_nobody", Some("sub_nobody"), at(1)),
        )
        .await;

        assert!(matches!(result, ReconciliationResult::Deferred { .. }));
    }

    #[tokio::test]
    async fn payment_resolves_account_by_email_reference() {
        let fixture = Fixture::new();
        let account = fixture.account().await;
        let body = json!({
            "eventKind": "PAYMENT_RECEIVED",
            "payload": {
                "id": "pay_x",
                "customerRef": "cus_unlinked",
                "status": "RECEIVED",
                "billingMethod": "PIX",
                "value": 49.9,
                "externalReference": account.email.as_str()
            }
        })
        .to_string()
        .into_bytes();

        let result = run(&handler(&fixture), body).await;

        assert!(matches!(result, ReconciliationResult::Applied { to: SubscriptionStatus::Active, .. }));
        assert_eq!(
            fixture.stored(&account.id).await.external_customer_id.as_deref(),
            Some("cus_unlinked")
        );
    }

    #[tokio::test]
    async fn malformed_payload_is_a_validation_error() {
        let fixture = Fixture::new();

        let err = handler(&fixture)
            .handle(ReconcileWebhookCommand {
                body: br#"{"eventKind":"PAYMENT_CONFIRMED","payload":[1,2]}"#.to_vec(),
                received_at: Timestamp::now(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Validation { .. }));
    }

    #[tokio::test]
    async fn unsupported_kind_is_ignored() {
        let fixture = Fixture::new();
        let body = json!({"eventKind": "INVOICE_CREATED", "payload": {"id": "inv_1"}})
            .to_string()
            .into_bytes();

        let result = run(&handler(&fixture), body).await;

        assert!(matches!(result, ReconciliationResult::Ignored { .. }));
    }

    #[tokio::test]
    async fn late_confirmation_does_not_resurrect_canceled_account() {
        let fixture = Fixture::new();
        let account = fixture.primary_account().await;
        let customer = account.external_customer_id.clone().unwrap();
        let subscription = account.external_subscription_id.clone().unwrap();
        let handler = handler(&fixture);

        run(
            &handler,
            subscription_event("SUBSCRIPTION_CANCELED", &subscription, &customer, None, Some(at(300))),
        )
        .await;
        let result = run(
            &handler,
            payment("PAYMENT_CONFIRMED", &customer, Some(&subscription), at(400)),
        )
        .await;

        assert!(matches!(result, ReconciliationResult::Ignored { .. }));
        let stored = fixture.stored(&account.id).await;
        assert_eq!(stored.status, SubscriptionStatus::Canceled);
        assert_eq!(stored.subscription_end, Some(at(300)));
    }

    #[tokio::test]
    async fn stale_event_is_ignored() {
        let fixture = Fixture::new();
        let account = fixture.primary_account().await;
        let customer = account.external_customer_id.clone().unwrap();
        let subscription = account.external_subscription_id.clone().unwrap();
        let handler = handler(&fixture);

        run(&handler, payment("PAYMENT_OVERDUE", &customer, Some(&subscription), at(500))).await;
        let result = run(
            &handler,
            subscription_event("SUBSCRIPTION_SUSPENDED", &subscription, &customer, None, Some(at(400))),
        )
        .await;

        assert_eq!(
            result,
            ReconciliationResult::ignored("event older than current status")
        );
        assert_eq!(fixture.stored(&account.id).await.status, SubscriptionStatus::PastDue);
    }

    #[tokio::test]
    async fn event_kind_wins_over_payload_status() {
        let fixture = Fixture::new();
        let account = fixture.primary_account().await;
        let customer = account.external_customer_id.clone().unwrap();
        let subscription = account.external_subscription_id.clone().unwrap();

        // Payload says ACTIVE, kind says canceled.
        let result = run(
            &handler(&fixture),
            subscription_event("SUBSCRIPTION_CANCELED", &subscription, &customer, None, None),
        )
        .await;

        assert!(matches!(result, ReconciliationResult::Applied { to: SubscriptionStatus::Canceled, .. }));
    }

    #[tokio::test]
    async fn first_paid_transition_notifies_once() {
        let fixture = Fixture::new();
        let mut account = fixture.account().await;
        account.external_customer_id = Some("cus_n".to_string());
        fixture.accounts.update(&account).await.unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let handler = handler(&fixture).with_notifier(notifier.clone());
        let body = payment("PAYMENT_CONFIRMED", "cus_n", None, at(10));

        run(&handler, body.clone()).await;
        run(&handler, body).await;
        wait_for_notifications(&notifier, 1).await;

        assert_eq!(notifier.notified(), vec![account.id]);
    }

    #[tokio::test]
    async fn failing_notifier_does_not_fail_webhook() {
        let fixture = Fixture::new();
        let mut account = fixture.account().await;
        account.external_customer_id = Some("cus_f".to_string());
        fixture.accounts.update(&account).await.unwrap();
        let notifier = Arc::new(RecordingNotifier::failing());
        let handler = handler(&fixture).with_notifier(notifier.clone());

        let result = run(&handler, payment("PAYMENT_CONFIRMED", "cus_f", None, at(10))).await;
        wait_for_notifications(&notifier, 1).await;

        assert!(matches!(result, ReconciliationResult::Applied { .. }));
        assert_eq!(notifier.notified().len(), 1);
    }

    #[tokio::test]
    async fn ledger_short_circuits_repeated_event_id() {
        let fixture = Fixture::new();
        let mut account = fixture.account().await;
        account.external_customer_id = Some("cus_l".to_string());
        fixture.accounts.update(&account).await.unwrap();
        let handler = handler(&fixture).with_ledger(Arc::new(InMemoryEventLedger::new()));
        let body = json!({
            "eventKind": "PAYMENT_CONFIRMED",
            "eventId": "evt_1",
            "payload": {
                "id": "pay_l",
                "customerRef": "cus_l",
                "status": "CONFIRMED",
                "billingMethod": "CREDIT_CARD",
                "value": 49.9
            }
        })
        .to_string()
        .into_bytes();

        run(&handler, body.clone()).await;
        let second = run(&handler, body).await;

        assert_eq!(
            second,
            ReconciliationResult::Duplicate {
                event_id: "evt_1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn deferred_events_are_not_recorded_in_ledger() {
        let fixture = Fixture::new();
        let ledger = Arc::new(InMemoryEventLedger::new());
        let handler = handler(&fixture).with_ledger(ledger.clone());
        let body = json!({
            "eventKind": "SUBSCRIPTION_CREATED",
            "eventId": "evt_early",
            "payload": {"id": "sub_e", "customerRef": "cus_e", "status": "ACTIVE"}
        })
        .to_string()
        .into_bytes();

        run(&handler, body).await;

        assert!(!ledger.contains("evt_early").await.unwrap());
    }

    #[tokio::test]
    async fn paid_seat_payment_promotes_pending_seat() {
        let fixture = Fixture::new();
        let account = fixture.primary_account().await;
        let mut pending =
            PendingSeat::reserve(account.id, candidate(1), BillingMethod::CreditCard, 30);
        pending.attach_payment("pay_seat".to_string(), Some("sub_seat".to_string()));
        fixture.seats.reserve_pending(&pending).await.unwrap();
        let body = json!({
            "eventKind": "PAYMENT_CONFIRMED",
            "payload": {
                "id": "pay_seat",
                "customerRef": account.external_customer_id.clone().unwrap(),
                "subscriptionRef": "sub_seat",
                "status": "CONFIRMED",
                "billingMethod": "CREDIT_CARD",
                "value": 19.9,
                "externalReference": pending.external_reference()
            }
        })
        .to_string()
        .into_bytes();

        let result = run(&handler(&fixture), body.clone()).await;

        assert_eq!(
            result,
            ReconciliationResult::SeatPromoted {
                account_id: account.id,
                candidate_id: "cand-1".to_string(),
                seat_count: 1,
            }
        );
        assert!(fixture.seats.find_pending(&pending.id).await.unwrap().is_none());
        let stored = fixture.stored(&account.id).await;
        assert_eq!(stored.seat_count, 1);
        assert_eq!(stored.status, SubscriptionStatus::Active);

        // Redelivery after promotion touches nothing.
        let again = run(&handler(&fixture), body).await;
        assert_eq!(again, ReconciliationResult::Unchanged { account_id: account.id });
        assert_eq!(fixture.stored(&account.id).await.seat_count, 1);
    }

    #[tokio::test]
    async fn seat_payment_for_candidate_linked_elsewhere_fails_loudly() {
        let fixture = Fixture::new();
        let owner = fixture.primary_account().await;
        let other = fixture.primary_account().await;
        fixture
            .seats
            .save_seat(&Seat::promote(other.id, candidate(5), Some("sub_other".into())))
            .await
            .unwrap();
        let mut pending = PendingSeat::reserve(owner.id, candidate(5), BillingMethod::CreditCard, 30);
        pending.attach_payment("pay_dup".to_string(), None);
        fixture.seats.reserve_pending(&pending).await.unwrap();
        let body = json!({
            "eventKind": "PAYMENT_RECEIVED",
            "payload": {
                "id": "pay_dup",
                "customerRef": owner.external_customer_id.clone().unwrap(),
                "status": "RECEIVED",
                "billingMethod": "PIX",
                "value": 19.9
            }
        })
        .to_string()
        .into_bytes();

        let result = run(&handler(&fixture), body).await;

        assert!(matches!(result, ReconciliationResult::Failed { .. }));
        assert!(fixture.seats.find_pending(&pending.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn seat_subscription_cancel_suspends_seat_and_recounts() {
        let fixture = Fixture::new();
        let account = fixture.primary_account().await;
        fixture
            .seats
            .save_seat(&Seat::promote(account.id, candidate(2), Some("sub_s2".into())))
            .await
            .unwrap();
        fixture.seat_counter().recount(account.id).await.unwrap();
        let customer = account.external_customer_id.clone().unwrap();
        let handler = handler(&fixture);

        let result = run(
            &handler,
            subscription_event("SUBSCRIPTION_INACTIVATED", "sub_s2", &customer, None, None),
        )
        .await;

        assert_eq!(
            result,
            ReconciliationResult::SeatSuspended {
                account_id: account.id,
                candidate_id: "cand-2".to_string(),
                seat_count: 0,
            }
        );
        let stored = fixture.stored(&account.id).await;
        assert_eq!(stored.status, SubscriptionStatus::Active);
        assert_eq!(stored.seat_count, 0);

        // Already suspended: no-op.
        let again = run(
            &handler,
            subscription_event("SUBSCRIPTION_CANCELED", "sub_s2", &customer, None, None),
        )
        .await;
        assert_eq!(again, ReconciliationResult::Unchanged { account_id: account.id });
    }

    #[tokio::test]
    async fn seat_subscription_overdue_suspends_seat_but_not_primary() {
        let fixture = Fixture::new();
        let account = fixture.primary_account().await;
        fixture
            .seats
            .save_seat(&Seat::promote(account.id, candidate(3), Some("sub_s3".into())))
            .await
            .unwrap();
        fixture.seat_counter().recount(account.id).await.unwrap();
        let customer = account.external_customer_id.clone().unwrap();

        let result = run(
            &handler(&fixture),
            payment("PAYMENT_OVERDUE", &customer, Some("sub_s3"), at(10)),
        )
        .await;

        assert_eq!(
            result,
            ReconciliationResult::SeatSuspended {
                account_id: account.id,
                candidate_id: "cand-3".to_string(),
                seat_count: 0,
            }
        );
        let stored = fixture.stored(&account.id).await;
        assert_eq!(stored.status, SubscriptionStatus::Active);
        assert_eq!(stored.seat_count, 0);
        assert_eq!(stored.last_payment_status, account.last_payment_status);
    }

    #[tokio::test]
    async fn refunded_seat_payment_suspends_seat_and_paid_one_does_not_restore_it() {
        let fixture = Fixture::new();
        let account = fixture.primary_account().await;
        fixture
            .seats
            .save_seat(&Seat::promote(account.id, candidate(4), Some("sub_s4".into())))
            .await
            .unwrap();
        fixture.seat_counter().recount(account.id).await.unwrap();
        let customer = account.external_customer_id.clone().unwrap();
        let handler = handler(&fixture);

        let refunded = run(
            &handler,
            payment("PAYMENT_REFUNDED", &customer, Some("sub_s4"), at(20)),
        )
        .await;
        let paid = run(
            &handler,
            payment("PAYMENT_CONFIRMED", &customer, Some("sub_s4"), at(30)),
        )
        .await;

        assert!(matches!(
            refunded,
            ReconciliationResult::SeatSuspended { seat_count: 0, .. }
        ));
        assert_eq!(paid, ReconciliationResult::Unchanged { account_id: account.id });
        let seat = fixture
            .seats
            .find_seat_by_candidate(&candidate(4).candidate_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seat.billing, SeatBilling::Suspended);
        assert_eq!(fixture.stored(&account.id).await.seat_count, 0);
    }

    #[tokio::test]
    async fn paid_payment_for_vanished_seat_reservation_fails() {
        let fixture = Fixture::new();
        let account = fixture.primary_account().await;
        // Reserved and then cancelled: the reference outlives the record.
        let gone = PendingSeat::reserve(account.id, candidate(6), BillingMethod::CreditCard, 30);
        let seat_payment = |kind: &str, status: &str| {
            json!({
                "eventKind": kind,
                "payload": {
                    "id": "pay_gone",
                    "customerRef": account.external_customer_id.clone().unwrap(),
                    "subscriptionRef": "sub_gone",
                    "status": status,
                    "billingMethod": "CREDIT_CARD",
                    "value": 19.9,
                    "externalReference": gone.external_reference()
                }
            })
            .to_string()
            .into_bytes()
        };
        let handler = handler(&fixture);

        let unpaid = run(&handler, seat_payment("PAYMENT_CREATED", "PENDING")).await;
        let paid = run(&handler, seat_payment("PAYMENT_CONFIRMED", "CONFIRMED")).await;

        assert_eq!(unpaid, ReconciliationResult::ignored("seat reservation already resolved"));
        assert!(matches!(paid, ReconciliationResult::Failed { .. }));
        let stored = fixture.stored(&account.id).await;
        assert_eq!(stored.seat_count, 0);
        assert_eq!(stored.last_payment_status, account.last_payment_status);
    }

    #[tokio::test]
    async fn payment_for_unlinked_subscription_changes_nothing() {
        let fixture = Fixture::new();
        let account = fixture.primary_account().await;
        let customer = account.external_customer_id.clone().unwrap();
        let before = fixture.stored(&account.id).await;

        let result = run(
            &handler(&fixture),
            payment("PAYMENT_OVERDUE", &customer, Some("sub_stranger"), at(30)),
        )
        .await;

        assert_eq!(
            result,
            ReconciliationResult::ignored("subscription is not the account's linked subscription")
        );
        assert_eq!(fixture.stored(&account.id).await, before);
    }

    #[tokio::test]
    async fn overdue_delivered_before_activation_ends_past_due() {
        let fixture = Fixture::new();
        let mut account = fixture.account().await;
        account.external_customer_id = Some("cus_o".to_string());
        fixture.accounts.update(&account).await.unwrap();
        let handler = handler(&fixture);

        let overdue = run(&handler, payment("PAYMENT_OVERDUE", "cus_o", Some("sub_o"), at(200))).await;
        assert!(matches!(overdue, ReconciliationResult::Ignored { .. }));
        assert_eq!(fixture.stored(&account.id).await.status, SubscriptionStatus::Trial);

        let activated = run(
            &handler,
            subscription_event("SUBSCRIPTION_ACTIVATED", "sub_o", "cus_o", None, Some(at(100))),
        )
        .await;

        assert_eq!(
            activated,
            ReconciliationResult::Applied {
                account_id: account.id,
                from: SubscriptionStatus::Trial,
                to: SubscriptionStatus::PastDue,
            }
        );
        let stored = fixture.stored(&account.id).await;
        assert_eq!(stored.status, SubscriptionStatus::PastDue);
        assert_eq!(stored.subscription_start, Some(at(100)));
        assert_eq!(stored.status_changed_at, Some(at(200)));
        assert!(stored.held_transitions.is_empty());
    }
}
