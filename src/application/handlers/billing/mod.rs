//! Billing handlers.
//!
//! ## Commands
//! - Creating a checkout (with saga rollback)
//! - Reconciling gateway webhooks
//! - Adding, removing, suspending and reactivating seats
//! - Cancelling a pending seat purchase
//!
//! ## Queries
//! - Resolving payment status (local, then gateway)
//! - Computing the billing breakdown
//! - Polling a payment until paid, expired or cancelled

mod add_seat;
mod cancel_pending_seat;
mod compute_billing;
mod create_checkout;
mod poll_payment;
mod reactivate_seat;
mod reconcile_webhook;
mod remove_seat;
mod resolve_status;
mod seat_billing;
mod seat_counter;
mod suspend_seat;

#[cfg(test)]
pub(crate) mod test_support;

// Commands
pub use add_seat::{AddSeatCommand, AddSeatHandler, AddSeatResult};
pub use cancel_pending_seat::{
    CancelPendingSeatCommand, CancelPendingSeatHandler, CancelPendingSeatResult,
};
pub use create_checkout::{CreateCheckoutCommand, CreateCheckoutHandler, CreateCheckoutResult};
pub use reactivate_seat::{ReactivateSeatCommand, ReactivateSeatHandler, ReactivateSeatResult};
pub use reconcile_webhook::{
    ReconcileWebhookCommand, ReconcileWebhookHandler, ReconciliationResult,
};
pub use remove_seat::{RemoveSeatCommand, RemoveSeatHandler, RemoveSeatResult};
pub use suspend_seat::{SuspendSeatCommand, SuspendSeatHandler, SuspendSeatResult};

// Queries
pub use compute_billing::{ComputeBillingHandler, ComputeBillingQuery};
pub use poll_payment::{
    PollConfig, PollPaymentCommand, PollPaymentHandler, PollState, PollingSession,
};
pub use resolve_status::{
    GatewayStatusSource, LocalStatusSource, PaymentStatusView, ResolveStatusHandler,
    StatusQuery, StatusSource, StatusSourceKind,
};

pub use seat_counter::SeatCounter;
