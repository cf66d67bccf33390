//! Account aggregate - billing identity of a tenant.
//!
//! # Invariants
//!
//! - `status` only moves along the edges of [`SubscriptionStatus`]
//! - `seat_count` is always written from a recount, never incremented
//! - `plan` agrees with `seat_count` after every seat sync
//! - `status_changed_at` is the gateway time of the newest event that
//!   asserted `status`, or `None` when that event carried no time
//! - `subscription_start` is the earliest activation time seen
//!
//! # Ordering
//!
//! The gateway may deliver events out of order. A timestamped event whose
//! transition is not legal yet (an overdue charge reported before the
//! activation that precedes it) is held on the account and replayed, in
//! event-time order, after every later status change. For any history the
//! gateway can produce, every delivery order ends in the same status.

use crate::domain::foundation::{AccountId, Email, StateMachine, Timestamp};
use serde::{Deserialize, Serialize};

use super::{PaymentStatus, PlanTier, SubscriptionStatus};

/// Held transitions kept per account. The oldest is dropped beyond this.
const MAX_HELD_TRANSITIONS: usize = 8;

/// Result of asking the account to move to a new status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The status moved. `to` is where it ended after replaying held events.
    Changed {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },
    /// Already in the target status. Nothing to write.
    Unchanged,
    /// Not an edge of the state machine. Ignored.
    Illegal {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },
    /// Not an edge yet; kept until an earlier event makes it one.
    Held {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },
    /// The event is older than the one that produced the current status.
    Stale {
        event_time: Timestamp,
        status_changed_at: Timestamp,
    },
}

impl TransitionOutcome {
    pub fn is_changed(&self) -> bool {
        matches!(self, TransitionOutcome::Changed { .. })
    }
}

/// A timestamped status event that arrived ahead of its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldTransition {
    pub target: SubscriptionStatus,
    pub occurred_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,

    /// Contact address; also a last-resort webhook lookup key.
    pub email: Email,

    /// Gateway customer, set on first checkout.
    pub external_customer_id: Option<String>,

    /// Gateway subscription, set once the gateway reports it.
    pub external_subscription_id: Option<String>,

    pub status: SubscriptionStatus,
    pub plan: PlanTier,
    pub subscription_start: Option<Timestamp>,
    pub subscription_end: Option<Timestamp>,
    pub seat_count: u32,

    /// Status of the most recent payment event, paid or not.
    pub last_payment_status: Option<PaymentStatus>,

    pub status_changed_at: Option<Timestamp>,

    /// Out-of-order events waiting for an earlier one, oldest first.
    pub held_transitions: Vec<HeldTransition>,

    /// Optimistic concurrency version, bumped by the store on every update.
    pub version: i64,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Account {
    /// A freshly registered account: trial, individual, no gateway links.
    pub fn register(id: AccountId, email: Email) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            email,
            external_customer_id: None,
            external_subscription_id: None,
            status: SubscriptionStatus::Trial,
            plan: PlanTier::Individual,
            subscription_start: None,
            subscription_end: None,
            seat_count: 0,
            last_payment_status: None,
            status_changed_at: None,
            held_transitions: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when this account has never been through checkout.
    pub fn is_first_checkout(&self) -> bool {
        self.external_customer_id.is_none() && self.external_subscription_id.is_none()
    }

    /// True when the primary plan exists at the gateway.
    pub fn has_primary_billing(&self) -> bool {
        self.external_customer_id.is_some() && self.external_subscription_id.is_some()
    }

    /// Gateway customer new seats are charged to.
    ///
    /// `None` unless the primary plan exists and is paid and current: a
    /// trial, overdue, suspended or canceled account cannot buy seats.
    pub fn seat_billing_customer(&self) -> Option<&str> {
        if !self.has_primary_billing() || self.status != SubscriptionStatus::Active {
            return None;
        }
        self.external_customer_id.as_deref()
    }

    /// Moves toward `target` as of `event_time`.
    ///
    /// Pure function of current state and event: applying the same event twice
    /// changes nothing the second time. Events older than the one that
    /// produced the current status are `Stale`. A timestamped event that is
    /// not an edge from the current status is `Held` and replayed after the
    /// next change. Untimed events are applied as they come and leave
    /// `status_changed_at` empty.
    pub fn reconcile_status(
        &mut self,
        target: SubscriptionStatus,
        event_time: Option<Timestamp>,
        now: Timestamp,
    ) -> TransitionOutcome {
        if let (SubscriptionStatus::Active, Some(activated_at)) = (target, event_time) {
            self.note_activation(activated_at, now);
        }

        let from = self.status;
        let outcome = self.step(target, event_time, now);
        match outcome {
            TransitionOutcome::Changed { .. } => {
                self.replay_held(now);
                TransitionOutcome::Changed {
                    from,
                    to: self.status,
                }
            }
            TransitionOutcome::Unchanged => {
                if self.replay_held(now) {
                    TransitionOutcome::Changed {
                        from,
                        to: self.status,
                    }
                } else {
                    TransitionOutcome::Unchanged
                }
            }
            other => other,
        }
    }

    /// One event against the current status, without replay.
    fn step(
        &mut self,
        target: SubscriptionStatus,
        event_time: Option<Timestamp>,
        now: Timestamp,
    ) -> TransitionOutcome {
        if self.status == target {
            self.confirm_status(event_time, now);
            return TransitionOutcome::Unchanged;
        }

        if let (Some(event_time), Some(changed_at)) = (event_time, self.status_changed_at) {
            if event_time.is_before(&changed_at) {
                return TransitionOutcome::Stale {
                    event_time,
                    status_changed_at: changed_at,
                };
            }
        }

        let from = self.status;
        let Ok(to) = from.transition_to(target) else {
            return match event_time {
                Some(occurred_at) if target != SubscriptionStatus::Trial && !from.is_terminal() => {
                    self.hold(HeldTransition { target, occurred_at }, now);
                    TransitionOutcome::Held { from, to: target }
                }
                _ => TransitionOutcome::Illegal { from, to: target },
            };
        };

        self.status = to;
        self.status_changed_at = event_time;
        self.updated_at = now;

        match to {
            SubscriptionStatus::Active if self.subscription_start.is_none() => {
                self.subscription_start = Some(event_time.unwrap_or(now));
            }
            SubscriptionStatus::Canceled => {
                self.subscription_end = Some(event_time.unwrap_or(now));
                self.held_transitions.clear();
            }
            _ => {}
        }

        TransitionOutcome::Changed { from, to }
    }

    /// A repeated event for the current status. A newer one moves
    /// `status_changed_at` forward.
    fn confirm_status(&mut self, event_time: Option<Timestamp>, now: Timestamp) {
        if let Some(event_time) = event_time {
            if self
                .status_changed_at
                .map_or(true, |changed_at| event_time.is_after(&changed_at))
            {
                self.status_changed_at = Some(event_time);
                self.updated_at = now;
            }
            if self.status == SubscriptionStatus::Canceled
                && self.subscription_end.map_or(true, |end| event_time.is_before(&end))
            {
                self.subscription_end = Some(event_time);
                self.updated_at = now;
            }
        }
        if self.status == SubscriptionStatus::Active && self.subscription_start.is_none() {
            self.subscription_start = Some(event_time.unwrap_or(now));
            self.updated_at = now;
        }
    }

    /// Activations only ever move the start date earlier.
    fn note_activation(&mut self, activated_at: Timestamp, now: Timestamp) {
        // Leaving trial records the first start itself.
        if self.status == SubscriptionStatus::Trial {
            return;
        }
        if self
            .subscription_start
            .map_or(true, |start| activated_at.is_before(&start))
        {
            self.subscription_start = Some(activated_at);
            self.updated_at = now;
        }
    }

    fn hold(&mut self, transition: HeldTransition, now: Timestamp) {
        if self.held_transitions.contains(&transition) {
            return;
        }
        self.held_transitions.push(transition);
        self.held_transitions.sort_by_key(|held| held.occurred_at);
        if self.held_transitions.len() > MAX_HELD_TRANSITIONS {
            self.held_transitions.remove(0);
        }
        self.updated_at = now;
    }

    /// Applies held events that the current status now allows, oldest
    /// first, and drops the ones it made stale. Returns true if the status
    /// moved.
    fn replay_held(&mut self, now: Timestamp) -> bool {
        let mut moved = false;
        loop {
            let before = self.held_transitions.len();
            let changed_at = self.status_changed_at;
            self.held_transitions.retain(|held| {
                changed_at.map_or(true, |changed_at| held.occurred_at.is_after(&changed_at))
            });
            if self.held_transitions.len() != before {
                self.updated_at = now;
            }

            let status = self.status;
            let Some(index) = self
                .held_transitions
                .iter()
                .position(|held| held.target == status || status.can_transition_to(&held.target))
            else {
                return moved;
            };
            let held = self.held_transitions.remove(index);
            self.updated_at = now;
            moved |= self.step(held.target, Some(held.occurred_at), now).is_changed();
        }
    }

    /// Links the gateway customer if none is linked yet.
    ///
    /// Returns false when a different customer is already linked.
    pub fn link_customer(&mut self, customer_id: &str) -> bool {
        match &self.external_customer_id {
            Some(existing) => existing == customer_id,
            None => {
                self.external_customer_id = Some(customer_id.to_string());
                self.updated_at = Timestamp::now();
                true
            }
        }
    }

    /// Links the gateway subscription if none is linked yet.
    ///
    /// Returns false when a different subscription is already linked.
    pub fn link_subscription(&mut self, subscription_id: &str) -> bool {
        match &self.external_subscription_id {
            Some(existing) => existing == subscription_id,
            None => {
                self.external_subscription_id = Some(subscription_id.to_string());
                self.updated_at = Timestamp::now();
                true
            }
        }
    }

    /// Records the latest payment status. Re-recording the same status is a no-op.
    pub fn record_payment_status(&mut self, status: PaymentStatus) {
        if self.last_payment_status.as_ref() == Some(&status) {
            return;
        }
        self.last_payment_status = Some(status);
        self.updated_at = Timestamp::now();
    }

    /// Writes a recounted seat total and realigns the plan tier.
    ///
    /// Returns true if anything changed.
    pub fn sync_seats(&mut self, active_seats: u32) -> bool {
        let plan = PlanTier::for_seat_count(active_seats);
        if self.seat_count == active_seats && self.plan == plan {
            return false;
        }
        self.seat_count = active_seats;
        self.plan = plan;
        self.updated_at = Timestamp::now();
        true
    }
}
