//! HTTP DTOs for billing endpoints.
//!
//! Request bodies are validated into domain types here, before any handler
//! runs. Responses mostly reuse the handlers' serializable results.

use serde::{Deserialize, Serialize};

use crate::application::handlers::billing::CreateCheckoutResult;
use crate::domain::billing::{BillingAddress, BillingMethod, BillingProfile, SeatCandidate};
use crate::domain::foundation::{CandidateId, ValidationError};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to provision gateway billing for an account.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCheckoutRequest {
    pub name: String,
    /// Tax document; punctuation is stripped.
    pub document: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub address: BillingAddress,
    pub billing_method: BillingMethod,
    /// Login identity created at sign-up, removed if the first checkout is rolled back.
    #[serde(default)]
    pub identity_id: Option<String>,
}

impl CreateCheckoutRequest {
    pub fn profile(&self) -> Result<BillingProfile, ValidationError> {
        BillingProfile::new(
            self.name.clone(),
            &self.document,
            &self.email,
            self.phone.clone(),
            self.address.clone(),
        )
    }

    pub fn identity(&self) -> Result<Option<CandidateId>, ValidationError> {
        self.identity_id.clone().map(CandidateId::new).transpose()
    }
}

/// Request to buy a seat for a candidate.
#[derive(Debug, Clone, Deserialize)]
pub struct AddSeatRequest {
    pub candidate_id: String,
    pub email: String,
    pub name: String,
    pub billing_method: BillingMethod,
}

impl AddSeatRequest {
    pub fn candidate(&self) -> Result<SeatCandidate, ValidationError> {
        SeatCandidate::new(self.candidate_id.clone(), &self.email, self.name.clone())
    }
}

/// Optional overrides for a payment wait.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WaitParams {
    /// Seconds to wait before giving up; defaults to the configured deadline.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub external_checkout_id: String,
    pub customer_id: String,
}

impl From<CreateCheckoutResult> for CheckoutResponse {
    fn from(result: CreateCheckoutResult) -> Self {
        Self {
            checkout_url: result.checkout_url,
            external_checkout_id: result.external_checkout_id,
            customer_id: result.customer_id,
        }
    }
}

/// Standard error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Whether the same request may be retried.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}
