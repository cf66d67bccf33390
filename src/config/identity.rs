//! Identity provider configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

/// Zitadel management API access, used to delete the login identity of a
/// registration that was rolled back
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Zitadel instance URL
    pub issuer_url: String,

    /// Service account personal access token
    pub service_token: SecretString,
}

impl IdentityConfig {
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.issuer_url.is_empty() {
            return Err(ValidationError::MissingRequired("IDENTITY__ISSUER_URL"));
        }
        if self.service_token.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("IDENTITY__SERVICE_TOKEN"));
        }
        if *environment == Environment::Production && !self.issuer_url.starts_with("https://") {
            return Err(ValidationError::MustBeHttps("Identity issuer URL"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> IdentityConfig {
        IdentityConfig {
            issuer_url: url.to_string(),
            service_token: SecretString::new("pat".to_string()),
        }
    }

    #[test]
    fn test_https_required_in_production() {
        assert!(config("http://zitadel.local").validate(&Environment::Development).is_ok());
        assert_eq!(
            config("http://zitadel.local").validate(&Environment::Production),
            Err(ValidationError::MustBeHttps("Identity issuer URL"))
        );
    }

    #[test]
    fn test_missing_url() {
        assert!(config("").validate(&Environment::Development).is_err());
    }
}
