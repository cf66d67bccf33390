//! Payment gateway configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;

/// Gateway API access and inbound webhook credentials
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// REST API base URL
    pub api_base_url: String,

    /// API key sent in the `access_token` header
    pub api_key: SecretString,

    /// Token the gateway sends back on every webhook delivery
    pub webhook_access_token: SecretString,

    /// HMAC secret for signed deliveries; signatures are not checked when unset
    #[serde(default)]
    pub webhook_signing_secret: Option<SecretString>,

    /// Client-side timeout for every gateway call, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate gateway configuration
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.api_base_url.is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY__API_BASE_URL"));
        }
        if !self.api_base_url.starts_with("https://") && !self.api_base_url.starts_with("http://") {
            return Err(ValidationError::InvalidGatewayUrl);
        }
        if *environment == Environment::Production && !self.api_base_url.starts_with("https://") {
            return Err(ValidationError::MustBeHttps("Gateway API URL"));
        }
        if self.api_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY__API_KEY"));
        }
        if self.webhook_access_token.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY__WEBHOOK_ACCESS_TOKEN"));
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 120 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

fn default_request_timeout() -> u64 {
    20
}
