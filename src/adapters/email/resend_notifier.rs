//! Resend e-mail adapter for payment notifications.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::domain::billing::Account;
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::PaymentNotifier;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Clone)]
pub struct ResendConfig {
    pub api_key: SecretString,
    /// Full "From" header, e.g. `Billing <billing@example.com>`.
    pub from: String,
    pub reply_to: Option<String>,
    pub api_url: String,
}

impl ResendConfig {
    pub fn new(api_key: SecretString, from: impl Into<String>) -> Self {
        Self {
            api_key,
            from: from.into(),
            reply_to: None,
            api_url: RESEND_API_URL.to_string(),
        }
    }

    pub fn with_reply_to(mut self, reply_to: Option<String>) -> Self {
        self.reply_to = reply_to;
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct SendEmailBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
    subject: &'a str,
    text: String,
}

pub struct ResendNotifier {
    config: ResendConfig,
    http_client: reqwest::Client,
}

impl ResendNotifier {
    pub fn new(config: ResendConfig) -> Result<Self, DomainError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn confirmation_text(account: &Account) -> String {
        let plan = account.plan.as_str();
        format!(
            "Your payment was confirmed and your {} subscription is now active.\n\n\
             Account: {}\n",
            plan, account.id
        )
    }
}

#[async_trait]
impl PaymentNotifier for ResendNotifier {
    async fn payment_confirmed(&self, account: &Account) -> Result<(), DomainError> {
        let body = SendEmailBody {
            from: &self.config.from,
            to: [account.email.as_str()],
            reply_to: self.config.reply_to.as_deref(),
            subject: "Payment confirmed",
            text: Self::confirmation_text(account),
        };

        let response = self
            .http_client
            .post(&self.config.api_url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                DomainError::new(ErrorCode::InternalError, format!("Resend request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = response.text().await.unwrap_or_default();
            return Err(DomainError::new(
                ErrorCode::InternalError,
                format!("Resend rejected e-mail ({}): {}", status, detail),
            ));
        }

        tracing::debug!(account_id = %account.id, "Payment confirmation e-mail sent");
        Ok(())
    }
}
