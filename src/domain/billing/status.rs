//! Subscription status state machine.
//!
//! `trial -> active -> past_due -> suspended | canceled`, plus the direct
//! `active -> canceled` and the `suspended -> active` reactivation. Nothing
//! else is legal, and `canceled` is terminal.

use crate::domain::foundation::{StateMachine, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reconciled status of an account's primary subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Checkout created, first payment not confirmed yet.
    Trial,

    /// Paid and current.
    Active,

    /// A charge is overdue. Seats keep working.
    PastDue,

    /// Billing stopped by the gateway; can be reactivated.
    Suspended,

    /// Ended for good. Historical record only.
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    /// True when the subscription counts as paid for status queries.
    pub fn is_paid(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }

    /// Maps a gateway-reported subscription status string.
    ///
    /// Returns `None` for statuses that carry no lifecycle meaning.
    pub fn from_gateway(status: &str) -> Option<Self> {
        match status.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(SubscriptionStatus::Active),
            "PENDING" | "TRIAL" | "TRIALING" => Some(SubscriptionStatus::Trial),
            "OVERDUE" | "PAST_DUE" => Some(SubscriptionStatus::PastDue),
            "INACTIVE" | "SUSPENDED" => Some(SubscriptionStatus::Suspended),
            "CANCELED" | "CANCELLED" | "DELETED" | "EXPIRED" => {
                Some(SubscriptionStatus::Canceled)
            }
            _ => None,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial" => Ok(SubscriptionStatus::Trial),
            "active" => Ok(SubscriptionStatus::Active),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "suspended" => Ok(SubscriptionStatus::Suspended),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            other => Err(ValidationError::invalid_format(
                "subscription_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

impl StateMachine for SubscriptionStatus {
    const FIELD: &'static str = "subscription_status";

    fn valid_transitions(&self) -> &'static [Self] {
        use SubscriptionStatus::*;
        match self {
            Trial => &[Active],
            Active => &[PastDue, Canceled],
            PastDue => &[Suspended, Canceled],
            Suspended => &[Active],
            Canceled => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: [SubscriptionStatus; 5] = [
        SubscriptionStatus::Trial,
        SubscriptionStatus::Active,
        SubscriptionStatus::PastDue,
        SubscriptionStatus::Suspended,
        SubscriptionStatus::Canceled,
    ];

    #[test]
    fn trial_can_transition_to_active() {
        let result = SubscriptionStatus::Trial.transition_to(SubscriptionStatus::Active);
        assert_eq!(result, Ok(SubscriptionStatus::Active));
    }

    #[test]
    fn trial_cannot_skip_to_past_due() {
        assert!(!SubscriptionStatus::Trial.can_transition_to(&SubscriptionStatus::PastDue));
    }

    #[test]
    fn active_can_be_canceled_directly() {
        assert!(SubscriptionStatus::Active.can_transition_to(&SubscriptionStatus::Canceled));
    }

    #[test]
    fn past_due_can_be_suspended_or_canceled() {
        let status = SubscriptionStatus::PastDue;
        assert!(status.can_transition_to(&SubscriptionStatus::Suspended));
        assert!(status.can_transition_to(&SubscriptionStatus::Canceled));
        assert!(!status.can_transition_to(&SubscriptionStatus::Active));
    }

    #[test]
    fn suspended_can_reactivate() {
        assert!(SubscriptionStatus::Suspended.can_transition_to(&SubscriptionStatus::Active));
    }

    #[test]
    fn canceled_is_terminal() {
        assert!(SubscriptionStatus::Canceled.is_terminal());
        assert!(SubscriptionStatus::Canceled
            .transition_to(SubscriptionStatus::Active)
            .is_err());
    }

    #[test]
    fn only_active_is_paid() {
        assert!(SubscriptionStatus::Active.is_paid());
        assert!(!SubscriptionStatus::PastDue.is_paid());
        assert!(!SubscriptionStatus::Trial.is_paid());
    }

    #[test]
    fn gateway_statuses_map_to_lifecycle() {
        assert_eq!(
            SubscriptionStatus::from_gateway("ACTIVE"),
            Some(SubscriptionStatus::Active)
        );
        assert_eq!(
            SubscriptionStatus::from_gateway("inactive"),
            Some(SubscriptionStatus::Suspended)
        );
        assert_eq!(
            SubscriptionStatus::from_gateway("DELETED"),
            Some(SubscriptionStatus::Canceled)
        );
        assert_eq!(SubscriptionStatus::from_gateway("WHATEVER"), None);
    }

    #[test]
    fn string_form_roundtrips() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<SubscriptionStatus>(), Ok(status));
        }
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&SubscriptionStatus::PastDue).unwrap();
        assert_eq!(json, "\"past_due\"");
    }

    fn any_status() -> impl Strategy<Value = SubscriptionStatus> {
        prop::sample::select(ALL.to_vec())
    }

    proptest! {
        #[test]
        fn canceled_is_reachable_only_from_paying_states(from in any_status()) {
            prop_assert_eq!(
                from.can_transition_to(&SubscriptionStatus::Canceled),
                matches!(from, SubscriptionStatus::Active | SubscriptionStatus::PastDue)
            );
        }

        #[test]
        fn no_status_transitions_to_itself(status in any_status()) {
            prop_assert!(!status.can_transition_to(&status));
        }

        #[test]
        fn walks_never_leave_canceled(path in prop::collection::vec(any_status(), 0..20)) {
            let mut current = SubscriptionStatus::Canceled;
            for target in path {
                if let Ok(next) = current.transition_to(target) {
                    current = next;
                }
            }
            prop_assert_eq!(current, SubscriptionStatus::Canceled);
        }
    }
}
