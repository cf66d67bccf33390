//! Pending seat - a seat purchase awaiting payment.

use crate::domain::foundation::{AccountId, PendingSeatId, Timestamp};
use serde::{Deserialize, Serialize};

use super::{BillingMethod, PaymentStatus, SeatCandidate};

const SEAT_REFERENCE_PREFIX: &str = "seat:";

/// A requested seat not paid for yet.
///
/// At most one unresolved pending seat exists per (account, candidate email).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSeat {
    pub id: PendingSeatId,
    pub account_id: AccountId,
    pub candidate: SeatCandidate,

    /// Set once the gateway charge exists. `None` while the reservation is in flight.
    pub external_payment_id: Option<String>,
    pub external_subscription_id: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: BillingMethod,

    pub created_at: Timestamp,
    pub deadline: Timestamp,
}

impl PendingSeat {
    pub fn reserve(
        account_id: AccountId,
        candidate: SeatCandidate,
        payment_method: BillingMethod,
        ttl_minutes: i64,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: PendingSeatId::new(),
            account_id,
            candidate,
            external_payment_id: None,
            external_subscription_id: None,
            payment_status: None,
            payment_method,
            created_at: now,
            deadline: now.add_minutes(ttl_minutes),
        }
    }

    /// Reference attached to the gateway charge so webhooks route back here.
    pub fn external_reference(&self) -> String {
        format!("{}{}", SEAT_REFERENCE_PREFIX, self.id)
    }

    /// Extracts the pending seat id from a `seat:<id>` external reference.
    pub fn parse_reference(reference: &str) -> Option<PendingSeatId> {
        reference
            .strip_prefix(SEAT_REFERENCE_PREFIX)
            .and_then(|id| id.parse().ok())
    }

    /// True when the gateway charge has been created.
    pub fn has_payment(&self) -> bool {
        self.external_payment_id.is_some()
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status
            .as_ref()
            .is_some_and(|status| status.is_paid(self.payment_method))
    }

    /// Past its deadline and never paid.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now.is_after(&self.deadline) && !self.is_paid()
    }

    /// Records the gateway charge created for this reservation.
    ///
    /// A status the payment webhook recorded first is kept.
    pub fn attach_payment(&mut self, payment_id: String, subscription_id: Option<String>) {
        self.external_payment_id = Some(payment_id);
        if subscription_id.is_some() {
            self.external_subscription_id = subscription_id;
        }
        if self.payment_status.is_none() {
            self.payment_status = Some(PaymentStatus::Pending);
        }
    }

    /// Records a payment event. Ids already attached win over the event's.
    pub fn record_payment(
        &mut self,
        payment_id: &str,
        subscription_id: Option<&str>,
        status: PaymentStatus,
    ) {
        if self.external_payment_id.is_none() {
            self.external_payment_id = Some(payment_id.to_string());
        }
        if self.external_subscription_id.is_none() {
            self.external_subscription_id = subscription_id.map(str::to_string);
        }
        self.payment_status = Some(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> PendingSeat {
        PendingSeat::reserve(
            AccountId::new(),
            SeatCandidate::new("cand-1", "seat@example.com", "Seat").unwrap(),
            BillingMethod::CreditCard,
            30,
        )
    }

    #[test]
    fn reference_roundtrips() {
        let seat = pending();
        assert_eq!(
            PendingSeat::parse_reference(&seat.external_reference()),
            Some(seat.id)
        );
    }

    #[test]
    fn non_seat_references_are_ignored() {
        assert_eq!(PendingSeat::parse_reference("owner@example.com"), None);
        assert_eq!(PendingSeat::parse_reference("seat:not-a-uuid"), None);
    }

    #[test]
    fn fresh_reservation_has_no_payment() {
        let seat = pending();
        assert!(!seat.has_payment());
        assert!(!seat.is_paid());
    }

    #[test]
    fn attaching_the_charge_keeps_a_status_recorded_by_the_webhook() {
        let mut seat = pending();
        seat.record_payment("pay_1", Some("sub_1"), PaymentStatus::Overdue);

        seat.attach_payment("pay_1".into(), Some("sub_1".into()));

        assert_eq!(seat.payment_status, Some(PaymentStatus::Overdue));
        assert_eq!(seat.external_subscription_id.as_deref(), Some("sub_1"));
    }

    #[test]
    fn fresh_charge_starts_pending() {
        let mut seat = pending();
        seat.attach_payment("pay_1".into(), None);
        assert_eq!(seat.payment_status, Some(PaymentStatus::Pending));
    }

    #[test]
    fn webhook_does_not_replace_attached_ids() {
        let mut seat = pending();
        seat.attach_payment("pay_1".into(), Some("sub_1".into()));

        seat.record_payment("pay_other", Some("sub_other"), PaymentStatus::Received);

        assert_eq!(seat.external_payment_id.as_deref(), Some("pay_1"));
        assert_eq!(seat.external_subscription_id.as_deref(), Some("sub_1"));
        assert!(seat.is_paid());
    }

    #[test]
    fn expires_after_deadline_unless_paid() {
        let mut seat = pending();
        let later = seat.deadline.plus_secs(1);
        assert!(!seat.is_expired(seat.created_at));
        assert!(seat.is_expired(later));

        seat.attach_payment("pay_1".into(), None);
        seat.payment_status = Some(PaymentStatus::Confirmed);
        assert!(!seat.is_expired(later));
    }
}
