//! Billing domain module.
//!
//! Account billing state, the subscription status machine, seats and the
//! inbound webhook envelope.
//!
//! # Module Structure
//!
//! - `account` - Account aggregate and status reconciliation
//! - `status` - SubscriptionStatus state machine
//! - `plan` - PlanTier derived from seat count
//! - `payment` - payment status and "paid" classification
//! - `seat` / `pending_seat` - seat lifecycle
//! - `webhook` - envelope parsing and classification
//! - `breakdown` - billing total computation
//! - `profile` - checkout billing profile

mod account;
mod breakdown;
mod errors;
mod payment;
mod pending_seat;
mod plan;
mod profile;
mod seat;
mod status;
mod webhook;

pub use account::{Account, HeldTransition, TransitionOutcome};
pub use breakdown::{BillingBreakdown, Pricing};
pub use errors::BillingError;
pub use payment::{BillingMethod, PaymentStatus};
pub use pending_seat::PendingSeat;
pub use plan::PlanTier;
pub use profile::{BillingAddress, BillingProfile};
pub use seat::{Seat, SeatBilling, SeatCandidate};
pub use status::SubscriptionStatus;
pub use webhook::{
    PaymentEvent, PaymentEventKind, PaymentPayload, SubscriptionEvent, SubscriptionEventKind,
    SubscriptionPayload, WebhookBody, WebhookEvent,
};
