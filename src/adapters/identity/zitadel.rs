//! Zitadel management API adapter for identity removal.
//!
//! Calls `DELETE {issuer}/management/v1/users/{id}` with a service account
//! token. A 404 counts as success: the identity is already gone.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};

use crate::domain::foundation::{CandidateId, DomainError, ErrorCode};
use crate::ports::IdentityProvider;

#[derive(Clone)]
pub struct ZitadelConfig {
    pub issuer_url: String,
    pub service_token: SecretString,
}

impl ZitadelConfig {
    pub fn new(issuer_url: impl Into<String>, service_token: SecretString) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            service_token,
        }
    }

    fn user_url(&self, id: &CandidateId) -> String {
        format!(
            "{}/management/v1/users/{}",
            self.issuer_url.trim_end_matches('/'),
            id.as_str()
        )
    }
}

pub struct ZitadelIdentityProvider {
    config: ZitadelConfig,
    http_client: reqwest::Client,
}

impl ZitadelIdentityProvider {
    pub fn new(config: ZitadelConfig) -> Result<Self, DomainError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;
        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl IdentityProvider for ZitadelIdentityProvider {
    async fn delete_identity(&self, identity_id: &CandidateId) -> Result<(), DomainError> {
        let response = self
            .http_client
            .delete(self.config.user_url(identity_id))
            .bearer_auth(self.config.service_token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::InternalError,
                    format!("Identity deletion request failed: {}", e),
                )
            })?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                tracing::debug!(identity_id = %identity_id.as_str(), "Identity already absent");
                Ok(())
            }
            s => Err(DomainError::new(
                ErrorCode::InternalError,
                format!("Identity provider returned {}", s.as_u16()),
            )),
        }
    }
}
