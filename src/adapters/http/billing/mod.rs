//! HTTP adapter for billing endpoints.
//!
//! - `POST /webhooks/gateway` - Gateway notifications
//! - `/billing/accounts/:account_id/...` - Checkout, seats, billing breakdown
//! - `/billing/status/...` - Payment status and payment waits

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::ErrorResponse;
pub use handlers::{BillingApiError, BillingAppState, ACCESS_TOKEN_HEADER, SIGNATURE_HEADER};
pub use routes::billing_router;
