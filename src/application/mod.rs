//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Every write to an account goes through [`account_writer::AccountWriter`].

pub mod account_writer;
pub mod handlers;

pub use account_writer::{AccountGuard, AccountLocks, AccountWriter, Modified};
