//! Payment gateway port.
//!
//! Outbound calls to the external payment processor: customers, recurring
//! subscriptions (with their hosted checkout) and payments.
//!
//! # Design
//!
//! - **Gateway agnostic**: no wire types leak through this interface
//! - **Bounded**: implementations carry a client-side timeout, surfaced as a
//!   retryable `GatewayErrorCode::Timeout`
//! - **Absent is not an error**: lookups return `Ok(None)` for unknown ids

use crate::domain::billing::{BillingError, BillingMethod, BillingProfile, PaymentStatus};
use crate::domain::foundation::{DomainError, ErrorCode};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Create a customer. Returns the gateway customer id.
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<GatewayCustomer, GatewayError>;

    async fn delete_customer(&self, customer_id: &str) -> Result<(), GatewayError>;

    /// Create a recurring subscription with a hosted checkout.
    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<GatewaySubscription, GatewayError>;

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<GatewaySubscription>, GatewayError>;

    /// Payments of a subscription, most recent first.
    async fn list_subscription_payments(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<GatewayPayment>, GatewayError>;

    async fn get_payment(&self, payment_id: &str) -> Result<Option<GatewayPayment>, GatewayError>;

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    pub profile: BillingProfile,
    /// Our account id, echoed back by the gateway on webhooks.
    pub external_reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCustomer {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingCycle {
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub customer_id: String,
    pub value_cents: i64,
    pub cycle: BillingCycle,
    pub next_due_date: NaiveDate,
    pub billing_method: BillingMethod,
    pub description: String,
    pub external_reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySubscription {
    pub id: String,
    pub customer_id: String,
    /// Raw gateway status.
    pub status: String,
    pub checkout_url: Option<String>,
    pub next_due_date: Option<NaiveDate>,
    /// First charge generated for the subscription, when the gateway has one.
    pub first_payment_id: Option<String>,
    pub external_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    pub customer_id: String,
    pub subscription_id: Option<String>,
    pub status: PaymentStatus,
    pub billing_method: BillingMethod,
    pub value_cents: i64,
    pub due_date: Option<NaiveDate>,
    pub external_reference: Option<String>,
}

impl GatewayPayment {
    pub fn is_paid(&self) -> bool {
        self.status.is_paid(self.billing_method)
    }
}

/// Errors from gateway operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayError {
    pub code: GatewayErrorCode,
    pub message: String,
    /// Gateway's own error code, if it sent one.
    pub provider_code: Option<String>,
    pub retryable: bool,
}

impl GatewayError {
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Timeout, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Authentication, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Rejected, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(GatewayErrorCode::NotFound, format!("{} not found", resource))
    }

    pub fn is_timeout(&self) -> bool {
        self.code == GatewayErrorCode::Timeout
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

impl From<GatewayError> for BillingError {
    fn from(err: GatewayError) -> Self {
        BillingError::GatewayUnavailable {
            retryable: err.retryable,
            message: err.to_string(),
        }
    }
}

impl From<GatewayError> for DomainError {
    fn from(err: GatewayError) -> Self {
        let code = match err.code {
            GatewayErrorCode::NotFound => ErrorCode::NotFound,
            _ => ErrorCode::GatewayUnavailable,
        };
        DomainError::new(code, err.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorCode {
    Network,
    /// Client-side timeout elapsed.
    Timeout,
    Authentication,
    NotFound,
    RateLimitExceeded,
    /// The gateway refused the request (validation, declined card).
    Rejected,
    /// 5xx from the gateway.
    ProviderError,
    Unknown,
}

impl GatewayErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayErrorCode::Network
                | GatewayErrorCode::Timeout
                | GatewayErrorCode::RateLimitExceeded
                | GatewayErrorCode::ProviderError
        )
    }
}

impl std::fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayErrorCode::Network => "network_error",
            GatewayErrorCode::Timeout => "timeout",
            GatewayErrorCode::Authentication => "authentication_error",
            GatewayErrorCode::NotFound => "not_found",
            GatewayErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            GatewayErrorCode::Rejected => "rejected",
            GatewayErrorCode::ProviderError => "provider_error",
            GatewayErrorCode::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}
