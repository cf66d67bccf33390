//! ResolveStatusHandler - answers "did my payment go through".
//!
//! Sources are tried in rank order and the first one that knows the
//! reference answers. The local source reads reconciled state without any
//! network call; the gateway source covers the window before webhooks land.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{BillingError, PaymentStatus, SeatBilling};
use crate::ports::{AccountStore, GatewayClient, GatewayPayment, SeatStore};

/// What the caller is asking about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusQuery {
    Subscription(String),
    Payment(String),
}

impl StatusQuery {
    pub fn reference(&self) -> &str {
        match self {
            StatusQuery::Subscription(r) | StatusQuery::Payment(r) => r,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSourceKind {
    Local,
    Gateway,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusView {
    pub is_paid: bool,
    pub status: String,
    pub source: StatusSourceKind,
    pub next_due_date: Option<NaiveDate>,
}

/// One link of the resolution chain.
#[async_trait]
pub trait StatusSource: Send + Sync {
    fn kind(&self) -> StatusSourceKind;

    /// `Ok(None)` when this source does not know the reference.
    async fn resolve(&self, query: &StatusQuery) -> Result<Option<PaymentStatusView>, BillingError>;
}

/// Reconciled local state: accounts, seats and pending seats.
pub struct LocalStatusSource {
    accounts: Arc<dyn AccountStore>,
    seats: Arc<dyn SeatStore>,
}

impl LocalStatusSource {
    pub fn new(accounts: Arc<dyn AccountStore>, seats: Arc<dyn SeatStore>) -> Self {
        Self { accounts, seats }
    }

    fn view(is_paid: bool, status: impl Into<String>) -> PaymentStatusView {
        PaymentStatusView {
            is_paid,
            status: status.into(),
            source: StatusSourceKind::Local,
            next_due_date: None,
        }
    }
}

#[async_trait]
impl StatusSource for LocalStatusSource {
    fn kind(&self) -> StatusSourceKind {
        StatusSourceKind::Local
    }

    async fn resolve(&self, query: &StatusQuery) -> Result<Option<PaymentStatusView>, BillingError> {
        match query {
            StatusQuery::Subscription(reference) => {
                if let Some(account) = self.accounts.find_by_subscription_id(reference).await? {
                    return Ok(Some(Self::view(
                        account.status.is_paid(),
                        account.status.as_str(),
                    )));
                }
                if let Some(seat) = self.seats.find_seat_by_subscription(reference).await? {
                    return Ok(Some(Self::view(
                        seat.billing == SeatBilling::Active,
                        seat.billing.as_str(),
                    )));
                }
                Ok(None)
            }
            StatusQuery::Payment(reference) => {
                let Some(pending) = self.seats.find_pending_by_payment(reference).await? else {
                    return Ok(None);
                };
                let status = pending
                    .payment_status
                    .clone()
                    .unwrap_or(PaymentStatus::Pending);
                Ok(Some(Self::view(pending.is_paid(), status.as_str())))
            }
        }
    }
}

/// Asks the gateway directly.
pub struct GatewayStatusSource {
    gateway: Arc<dyn GatewayClient>,
}

impl GatewayStatusSource {
    pub fn new(gateway: Arc<dyn GatewayClient>) -> Self {
        Self { gateway }
    }

    fn payment_view(payment: &GatewayPayment, next_due_date: Option<NaiveDate>) -> PaymentStatusView {
        PaymentStatusView {
            is_paid: payment.is_paid(),
            status: payment.status.as_str().to_string(),
            source: StatusSourceKind::Gateway,
            next_due_date,
        }
    }
}

#[async_trait]
impl StatusSource for GatewayStatusSource {
    fn kind(&self) -> StatusSourceKind {
        StatusSourceKind::Gateway
    }

    async fn resolve(&self, query: &StatusQuery) -> Result<Option<PaymentStatusView>, BillingError> {
        match query {
            StatusQuery::Subscription(reference) => {
                let Some(subscription) = self.gateway.get_subscription(reference).await? else {
                    return Ok(None);
                };
                let payments = self.gateway.list_subscription_payments(reference).await?;
                // The most recent charge that left pending decides.
                let decisive = payments
                    .iter()
                    .find(|p| p.status != PaymentStatus::Pending)
                    .or_else(|| payments.first());
                Ok(Some(match decisive {
                    Some(payment) => Self::payment_view(payment, subscription.next_due_date),
                    None => PaymentStatusView {
                        is_paid: false,
                        status: PaymentStatus::Pending.as_str().to_string(),
                        source: StatusSourceKind::Gateway,
                        next_due_date: subscription.next_due_date,
                    },
                }))
            }
            StatusQuery::Payment(reference) => {
                let payment = self.gateway.get_payment(reference).await?;
                Ok(payment.map(|p| {
                    let due = p.due_date;
                    Self::payment_view(&p, due)
                }))
            }
        }
    }
}

pub struct ResolveStatusHandler {
    sources: Vec<Arc<dyn StatusSource>>,
}

impl ResolveStatusHandler {
    pub fn new(sources: Vec<Arc<dyn StatusSource>>) -> Self {
        Self { sources }
    }

    /// The standard chain: local first, then the gateway.
    pub fn local_then_gateway(
        accounts: Arc<dyn AccountStore>,
        seats: Arc<dyn SeatStore>,
        gateway: Arc<dyn GatewayClient>,
    ) -> Self {
        Self::new(vec![
            Arc::new(LocalStatusSource::new(accounts, seats)),
            Arc::new(GatewayStatusSource::new(gateway)),
        ])
    }

    /// Returns the first answer in rank order.
    ///
    /// A failing source is skipped. If no source answers, the last failure
    /// is returned, or `NotFound` when every source simply did not know.
    pub async fn handle(&self, query: StatusQuery) -> Result<PaymentStatusView, BillingError> {
        let mut last_error = None;

        for source in &self.sources {
            match source.resolve(&query).await {
                Ok(Some(view)) => {
                    tracing::debug!(
                        reference = %query.reference(),
                        source = ?source.kind(),
                        is_paid = view.is_paid,
                        "Payment status resolved"
                    );
                    return Ok(view);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        reference = %query.reference(),
                        source = ?source.kind(),
                        error = %e,
                        "Status source failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| BillingError::not_found("Payment", query.reference())))
    }
}
