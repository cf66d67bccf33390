//! Billing Reconciler - subscription and seat billing against an
//! asynchronous payment gateway.
//!
//! Keeps a local billing account consistent with a gateway that confirms
//! payments late, out of order and more than once: a compensating checkout
//! saga, an idempotent webhook state machine, seat lifecycle with recounted
//! seat totals, and client-facing payment polling.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
