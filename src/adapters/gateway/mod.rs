//! Payment gateway adapters.
//!
//! - `HttpGatewayClient` - REST client for the real gateway
//! - `MockGatewayClient` - in-memory gateway for tests and local runs
//! - `WebhookAuthenticator` - inbound delivery authentication

mod http_gateway;
mod mock_gateway;
mod webhook_auth;
mod wire_types;

pub use http_gateway::{HttpGatewayClient, HttpGatewayConfig};
pub use mock_gateway::{paid_card_payment, MethodCall, MockGatewayClient};
pub use webhook_auth::{
    hex_encode, sign, signature_header, SignatureHeader, WebhookAuthError, WebhookAuthenticator,
};
