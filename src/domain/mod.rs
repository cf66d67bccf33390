//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, errors)
//! - `billing` - Account billing state, subscription lifecycle and seats

pub mod billing;
pub mod foundation;
