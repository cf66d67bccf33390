//! Payment confirmation e-mail settings (Resend).
//!
//! Optional: without this section confirmed payments are not announced.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub resend_api_key: SecretString,

    #[serde(default = "default_from_email")]
    pub from_email: String,

    #[serde(default = "default_from_name")]
    pub from_name: String,

    /// Where customer replies to a confirmation go
    pub reply_to: Option<String>,
}

impl EmailConfig {
    /// `Name <address>` as Resend expects it.
    pub fn from_header(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_email)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.resend_api_key.expose_secret().as_str() {
            "" => return Err(ValidationError::MissingRequired("EMAIL__RESEND_API_KEY")),
            key if !key.starts_with("re_") => return Err(ValidationError::InvalidResendKey),
            _ => {}
        }
        let addresses = std::iter::once(self.from_email.as_str()).chain(self.reply_to.as_deref());
        for address in addresses {
            if !looks_like_address(address) {
                return Err(ValidationError::InvalidFromEmail);
            }
        }
        Ok(())
    }
}

fn looks_like_address(address: &str) -> bool {
    matches!(address.split_once('@'), Some((local, domain)) if !local.is_empty() && domain.contains('.'))
}

fn default_from_email() -> String {
    "billing@billing-reconciler.local".to_string()
}

fn default_from_name() -> String {
    "Billing".to_string()
}
