//! Inbound webhook authentication.
//!
//! The gateway sends a shared access token on every delivery. When a signing
//! secret is configured, deliveries also carry
//! `gateway-signature: t=<unix>,v1=<hex hmac-sha256 of "t.body">`.
//!
//! # Security
//!
//! - Constant-time comparison for both token and signature
//! - Timestamp validation (5-minute window) for replay protection

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age for signed deliveries (5 minutes).
const MAX_TIMESTAMP_AGE_SECS: i64 = 300;

/// Clock skew tolerance for future timestamps (60 seconds).
const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookAuthError {
    #[error("missing access token")]
    MissingToken,
    #[error("invalid access token")]
    InvalidToken,
    #[error("missing signature")]
    MissingSignature,
    #[error("malformed signature header")]
    MalformedSignature,
    #[error("delivery timestamp outside tolerance")]
    StaleTimestamp,
    #[error("signature mismatch")]
    SignatureMismatch,
}

/// Parsed `t=<unix>,v1=<hex>` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, WebhookAuthError> {
        let mut timestamp = None;
        let mut v1_signature = None;

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or(WebhookAuthError::MalformedSignature)?;
            match key.trim() {
                "t" => {
                    timestamp = Some(
                        value
                            .trim()
                            .parse()
                            .map_err(|_| WebhookAuthError::MalformedSignature)?,
                    )
                }
                "v1" => {
                    v1_signature =
                        Some(hex_decode(value.trim()).ok_or(WebhookAuthError::MalformedSignature)?)
                }
                _ => {}
            }
        }

        Ok(Self {
            timestamp: timestamp.ok_or(WebhookAuthError::MalformedSignature)?,
            v1_signature: v1_signature.ok_or(WebhookAuthError::MalformedSignature)?,
        })
    }
}

/// Verifies that a delivery really comes from the gateway.
#[derive(Clone)]
pub struct WebhookAuthenticator {
    access_token: SecretString,
    signing_secret: Option<SecretString>,
}

impl WebhookAuthenticator {
    pub fn new(access_token: SecretString, signing_secret: Option<SecretString>) -> Self {
        Self {
            access_token,
            signing_secret,
        }
    }

    /// Checks the token and, when configured, the body signature.
    pub fn verify(
        &self,
        token: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
        now_unix: i64,
    ) -> Result<(), WebhookAuthError> {
        let token = token.ok_or(WebhookAuthError::MissingToken)?;
        let expected = self.access_token.expose_secret().as_bytes();
        if expected.ct_eq(token.as_bytes()).unwrap_u8() != 1 {
            tracing::warn!("Webhook delivery with invalid access token");
            return Err(WebhookAuthError::InvalidToken);
        }

        let Some(secret) = &self.signing_secret else {
            return Ok(());
        };

        let header = SignatureHeader::parse(signature.ok_or(WebhookAuthError::MissingSignature)?)?;

        let age = now_unix - header.timestamp;
        if age > MAX_TIMESTAMP_AGE_SECS || age < -MAX_FUTURE_TOLERANCE_SECS {
            tracing::warn!(
                delivery_timestamp = header.timestamp,
                current_time = now_unix,
                age_secs = age,
                "Webhook delivery outside timestamp tolerance"
            );
            return Err(WebhookAuthError::StaleTimestamp);
        }

        let computed = sign(secret, header.timestamp, body);
        if computed.as_slice().ct_eq(&header.v1_signature).unwrap_u8() != 1 {
            tracing::warn!("Webhook delivery with invalid signature");
            return Err(WebhookAuthError::SignatureMismatch);
        }

        Ok(())
    }
}

/// HMAC-SHA256 of `"{timestamp}.{body}"`.
pub fn sign(secret: &SecretString, timestamp: i64, body: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so this never fails.
    let mut mac = match HmacSha256::new_from_slice(secret.expose_secret().as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

/// Builds a signature header value. Used by tests and local tooling.
pub fn signature_header(secret: &SecretString, timestamp: i64, body: &[u8]) -> String {
    format!("t={},v1={}", timestamp, hex_encode(&sign(secret, timestamp, body)))
}

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.is_empty() || hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|b| u8::from_str_radix(b, 16).ok()))
        .collect()
}

pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
