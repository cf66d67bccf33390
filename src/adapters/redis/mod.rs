//! Redis adapters.

mod event_ledger;

pub use event_ledger::RedisEventLedger;
