//! In-memory adapters for tests and local development.

mod account_store;
mod event_ledger;
mod seat_store;

pub use account_store::InMemoryAccountStore;
pub use event_ledger::InMemoryEventLedger;
pub use seat_store::InMemorySeatStore;
