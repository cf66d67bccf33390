//! Redis settings for the processed-event ledger.
//!
//! The whole section is optional; without it webhook deliveries are
//! deduplicated by state alone.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::redact_credentials;

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,

    /// Seconds allowed for the initial connection
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How long a processed event id is remembered. Should outlast the
    /// gateway's redelivery window.
    #[serde(default = "default_ledger_ttl")]
    pub ledger_ttl_secs: u64,
}

impl RedisConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn redacted_url(&self) -> String {
        redact_credentials(&self.url)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.url.split_once("://") {
            None if self.url.is_empty() => Err(ValidationError::MissingRequired("REDIS__URL")),
            Some(("redis" | "rediss", rest)) if !rest.is_empty() => {
                if self.connect_timeout_secs == 0 || self.ledger_ttl_secs == 0 {
                    return Err(ValidationError::InvalidTimeout);
                }
                Ok(())
            }
            _ => Err(ValidationError::InvalidRedisUrl),
        }
    }
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_ledger_ttl() -> u64 {
    7 * 24 * 60 * 60
}
