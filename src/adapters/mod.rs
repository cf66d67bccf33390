//! Adapters - Implementations of port interfaces.
//!
//! - `memory` - In-memory stores and event ledger
//! - `postgres` - PostgreSQL stores (sqlx)
//! - `redis` - Redis processed-event ledger
//! - `gateway` - Payment gateway REST client, mock, webhook authentication
//! - `email` - Resend payment notifier
//! - `identity` - Zitadel identity cleanup
//! - `http` - axum HTTP surface

pub mod email;
pub mod gateway;
pub mod http;
pub mod identity;
pub mod memory;
pub mod postgres;
pub mod redis;
