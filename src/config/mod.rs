//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables carry the `BILLING_RECONCILER`
//! prefix and nested values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use billing_reconciler::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod email;
mod error;
mod gateway;
mod identity;
mod polling;
mod pricing;
mod redis;
mod seats;
mod server;

pub use database::DatabaseConfig;
pub use email::EmailConfig;
pub use error::{ConfigError, ValidationError};
pub use gateway::GatewayConfig;
pub use identity::IdentityConfig;
pub use polling::PollingConfig;
pub use pricing::PricingConfig;
pub use redis::RedisConfig;
pub use seats::SeatsConfig;
pub use server::{Environment, LogFormat, ServerConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Processed webhook event ledger; disabled when absent
    #[serde(default)]
    pub redis: Option<RedisConfig>,

    /// Payment gateway API and webhook credentials
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub pricing: PricingConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub seats: SeatsConfig,

    /// Payment confirmation e-mail; no notifications are sent when absent
    #[serde(default)]
    pub email: Option<EmailConfig>,

    /// Identity cleanup on rolled-back registrations; skipped when absent
    #[serde(default)]
    pub identity: Option<IdentityConfig>,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `BILLING_RECONCILER` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `BILLING_RECONCILER__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `BILLING_RECONCILER__GATEWAY__API_KEY=...` -> `gateway.api_key = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed into the expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("BILLING_RECONCILER")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for the first invalid section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let environment = &self.server.environment;
        self.server.validate()?;
        self.database.validate()?;
        if let Some(redis) = &self.redis {
            redis.validate()?;
        }
        self.gateway.validate(environment)?;
        self.pricing.validate()?;
        self.polling.validate()?;
        self.seats.validate()?;
        if let Some(email) = &self.email {
            email.validate()?;
        }
        if let Some(identity) = &self.identity {
            identity.validate(environment)?;
        }
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

/// Masks the userinfo part of a connection URL.
fn redact_credentials(url: &str) -> String {
    match (url.split_once("://"), url.rsplit_once('@')) {
        (Some((scheme, _)), Some((_, host))) => format!("{}://***@{}", scheme, host),
        _ => url.to_string(),
    }
}
