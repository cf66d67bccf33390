//! REST payment gateway adapter.
//!
//! Implements `GatewayClient` over the gateway's JSON API.
//!
//! # Security
//!
//! - API key handled via `secrecy::SecretString`, sent in the `access_token` header
//!
//! # Configuration
//!
//! ```ignore
//! let config = HttpGatewayConfig::new("https://api.gateway.test/v3", api_key)
//!     .with_timeout(Duration::from_secs(20));
//! let gateway = HttpGatewayClient::new(config)?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::ports::{
    CreateCustomerRequest, CreateSubscriptionRequest, GatewayClient, GatewayCustomer,
    GatewayError, GatewayErrorCode, GatewayPayment, GatewaySubscription,
};

use super::wire_types::{
    CustomerBody, CustomerResponse, ErrorResponse, PaymentListResponse, PaymentResponse,
    SubscriptionBody, SubscriptionResponse,
};

const ACCESS_TOKEN_HEADER: &str = "access_token";

/// Gateway API configuration.
#[derive(Clone)]
pub struct HttpGatewayConfig {
    api_base_url: String,
    api_key: SecretString,
    timeout: Duration,
}

impl HttpGatewayConfig {
    pub fn new(api_base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout: Duration::from_secs(20),
        }
    }

    /// Client-side bound on every request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct HttpGatewayClient {
    config: HttpGatewayConfig,
    http_client: reqwest::Client,
}

impl HttpGatewayClient {
    pub fn new(config: HttpGatewayConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::new(GatewayErrorCode::Unknown, e.to_string()))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(ACCESS_TOKEN_HEADER, self.config.api_key.expose_secret())
    }

    async fn send(&self, builder: RequestBuilder, operation: &str) -> Result<Response, GatewayError> {
        self.authorized(builder).send().await.map_err(|e| {
            if e.is_timeout() {
                tracing::warn!(operation, timeout_secs = self.config.timeout.as_secs(), "Gateway request timed out");
                GatewayError::timeout(format!("{} timed out", operation))
            } else {
                tracing::warn!(operation, error = %e, "Gateway request failed");
                GatewayError::network(e.to_string())
            }
        })
    }

    /// Maps a non-success response to a `GatewayError`.
    async fn error_from(response: Response, operation: &str) -> GatewayError {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let body: ErrorResponse = serde_json::from_str(&text).unwrap_or_default();

        let code = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayErrorCode::Authentication,
            StatusCode::NOT_FOUND => GatewayErrorCode::NotFound,
            StatusCode::TOO_MANY_REQUESTS => GatewayErrorCode::RateLimitExceeded,
            s if s.is_server_error() => GatewayErrorCode::ProviderError,
            s if s.is_client_error() => GatewayErrorCode::Rejected,
            _ => GatewayErrorCode::Unknown,
        };

        let detail = match body.describe() {
            d if d.is_empty() => text,
            d => d,
        };
        tracing::error!(operation, status = status.as_u16(), error = %detail, "Gateway call failed");

        let mut error = GatewayError::new(code, format!("{} failed: {}", operation, detail));
        if let Some(provider_code) = body.first_code() {
            error = error.with_provider_code(provider_code);
        }
        error
    }

    async fn parse<T: DeserializeOwned>(response: Response, operation: &str) -> Result<T, GatewayError> {
        response.json().await.map_err(|e| {
            GatewayError::new(
                GatewayErrorCode::ProviderError,
                format!("Failed to parse {} response: {}", operation, e),
            )
        })
    }

    /// GET returning `None` on 404.
    async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
        operation: &str,
    ) -> Result<Option<T>, GatewayError> {
        let response = self.send(self.http_client.get(self.url(path)), operation).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::error_from(response, operation).await);
        }
        Self::parse(response, operation).await.map(Some)
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<GatewayCustomer, GatewayError> {
        let body = CustomerBody::from(request);
        let response = self
            .send(
                self.http_client.post(self.url("/customers")).json(&body),
                "create_customer",
            )
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, "create_customer").await);
        }

        let customer: CustomerResponse = Self::parse(response, "create_customer").await?;
        Ok(GatewayCustomer { id: customer.id })
    }

    async fn delete_customer(&self, customer_id: &str) -> Result<(), GatewayError> {
        let response = self
            .send(
                self.http_client
                    .delete(self.url(&format!("/customers/{}", customer_id))),
                "delete_customer",
            )
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, "delete_customer").await);
        }
        Ok(())
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<GatewaySubscription, GatewayError> {
        let body = SubscriptionBody::from(request);
        let response = self
            .send(
                self.http_client.post(self.url("/subscriptions")).json(&body),
                "create_subscription",
            )
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, "create_subscription").await);
        }

        let subscription: SubscriptionResponse =
            Self::parse(response, "create_subscription").await?;

        // The first charge may not be generated yet; a missing one is not an error.
        let first_payment_id = match self.list_subscription_payments(&subscription.id).await {
            Ok(payments) => payments.last().map(|p| p.id.clone()),
            Err(e) => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    error = %e,
                    "Could not fetch first payment of new subscription"
                );
                None
            }
        };

        Ok(subscription.into_domain(first_payment_id))
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<GatewaySubscription>, GatewayError> {
        let subscription: Option<SubscriptionResponse> = self
            .get_optional(&format!("/subscriptions/{}", subscription_id), "get_subscription")
            .await?;
        Ok(subscription.map(|s| s.into_domain(None)))
    }

    async fn list_subscription_payments(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<GatewayPayment>, GatewayError> {
        let list: Option<PaymentListResponse> = self
            .get_optional(
                &format!("/subscriptions/{}/payments", subscription_id),
                "list_subscription_payments",
            )
            .await?;

        let mut payments: Vec<GatewayPayment> = list
            .map(|l| l.data.into_iter().map(GatewayPayment::from).collect())
            .unwrap_or_default();
        payments.sort_by(|a, b| b.due_date.cmp(&a.due_date));
        Ok(payments)
    }

    async fn get_payment(&self, payment_id: &str) -> Result<Option<GatewayPayment>, GatewayError> {
        let payment: Option<PaymentResponse> = self
            .get_optional(&format!("/payments/{}", payment_id), "get_payment")
            .await?;
        Ok(payment.map(GatewayPayment::from))
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), GatewayError> {
        let response = self
            .send(
                self.http_client
                    .delete(self.url(&format!("/subscriptions/{}", subscription_id))),
                "cancel_subscription",
            )
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, "cancel_subscription").await);
        }
        Ok(())
    }
}
