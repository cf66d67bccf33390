//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Persistence Ports
//!
//! - `AccountStore` - Account billing records, version-checked writes
//! - `SeatStore` - Pending seat reservations and promoted seats
//! - `ProcessedEventLedger` - Optional webhook event id ledger
//!
//! ## External Service Ports
//!
//! - `GatewayClient` - Payment gateway (customers, subscriptions, payments)
//! - `PaymentNotifier` - Confirmation notifications
//! - `IdentityProvider` - Login identity removal on registration rollback

mod account_store;
mod gateway_client;
mod identity_provider;
mod notifier;
mod processed_event_ledger;
mod seat_store;

pub use account_store::AccountStore;
pub use gateway_client::{
    BillingCycle, CreateCustomerRequest, CreateSubscriptionRequest, GatewayClient,
    GatewayCustomer, GatewayError, GatewayErrorCode, GatewayPayment, GatewaySubscription,
};
pub use identity_provider::IdentityProvider;
pub use notifier::PaymentNotifier;
pub use processed_event_ledger::ProcessedEventLedger;
pub use seat_store::{ReserveOutcome, SeatStore};
