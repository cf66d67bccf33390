//! Inbound gateway webhook envelope.
//!
//! The wire envelope is `{ eventKind, payload, eventId?, occurredAt? }`. The
//! event kind prefix selects the payload shape (`PAYMENT_*` or
//! `SUBSCRIPTION_*`) and the payload must deserialize as exactly that shape.
//! Anything else is rejected here, before reconciliation sees it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, ValidationError};

use super::{BillingMethod, PaymentStatus, SubscriptionStatus};

// ════════════════════════════════════════════════════════════════════════════════
// Wire types
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    event_kind: String,
    payload: serde_json::Value,
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    occurred_at: Option<Timestamp>,
}

/// Payment payload as the gateway sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub id: String,
    pub customer_ref: String,
    #[serde(default)]
    pub subscription_ref: Option<String>,
    pub status: String,
    pub billing_method: String,
    /// Amount in currency units, as sent by the gateway.
    pub value: f64,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub external_reference: Option<String>,
}

impl PaymentPayload {
    pub fn method(&self) -> BillingMethod {
        BillingMethod::from_gateway(&self.billing_method)
    }

    pub fn value_cents(&self) -> i64 {
        (self.value * 100.0).round() as i64
    }
}

/// Subscription payload as the gateway sends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPayload {
    pub id: String,
    pub customer_ref: String,
    pub status: String,
    #[serde(default)]
    pub cycle: Option<String>,
    #[serde(default)]
    pub next_due_date: Option<NaiveDate>,
    #[serde(default)]
    pub external_reference: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Event kinds
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentEventKind {
    Created,
    Updated,
    Received,
    Confirmed,
    /// Card charge authorized.
    Approved,
    Overdue,
    Refunded,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionEventKind {
    Created,
    Activated,
    Updated,
    Suspended,
    Inactivated,
    Canceled,
    Deleted,
}

impl PaymentEventKind {
    fn parse(suffix: &str) -> Option<Self> {
        match suffix {
            "CREATED" => Some(Self::Created),
            "UPDATED" => Some(Self::Updated),
            "RECEIVED" | "RECEIVED_IN_CASH" => Some(Self::Received),
            "CONFIRMED" => Some(Self::Confirmed),
            "APPROVED" | "AUTHORIZED" | "APPROVED_BY_RISK_ANALYSIS" => Some(Self::Approved),
            "OVERDUE" => Some(Self::Overdue),
            "REFUNDED" => Some(Self::Refunded),
            "DELETED" => Some(Self::Deleted),
            _ => None,
        }
    }

    /// The payment status the kind itself asserts, if any.
    fn implied_status(&self) -> Option<PaymentStatus> {
        match self {
            Self::Received => Some(PaymentStatus::Received),
            Self::Confirmed => Some(PaymentStatus::Confirmed),
            Self::Approved => Some(PaymentStatus::Approved),
            Self::Overdue => Some(PaymentStatus::Overdue),
            Self::Refunded => Some(PaymentStatus::Refunded),
            Self::Deleted => Some(PaymentStatus::Canceled),
            Self::Created | Self::Updated => None,
        }
    }
}

impl SubscriptionEventKind {
    fn parse(suffix: &str) -> Option<Self> {
        match suffix {
            "CREATED" => Some(Self::Created),
            "ACTIVATED" => Some(Self::Activated),
            "UPDATED" => Some(Self::Updated),
            "SUSPENDED" => Some(Self::Suspended),
            "INACTIVATED" => Some(Self::Inactivated),
            "CANCELED" | "CANCELLED" => Some(Self::Canceled),
            "DELETED" => Some(Self::Deleted),
            _ => None,
        }
    }

    /// True for kinds that stop billing.
    pub fn ends_billing(&self) -> bool {
        matches!(
            self,
            Self::Suspended | Self::Inactivated | Self::Canceled | Self::Deleted
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Classified events
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentEvent {
    pub kind: PaymentEventKind,
    pub payload: PaymentPayload,
}

impl PaymentEvent {
    /// Status of the payment: the kind wins, the payload status fills in.
    pub fn effective_status(&self) -> PaymentStatus {
        self.kind
            .implied_status()
            .unwrap_or_else(|| PaymentStatus::from_gateway(&self.payload.status))
    }

    pub fn is_paid(&self) -> bool {
        self.effective_status().is_paid(self.payload.method())
    }

    pub fn is_overdue(&self) -> bool {
        self.effective_status() == PaymentStatus::Overdue
    }

    /// Overdue or refunded: whatever the charge paid for is no longer paid.
    pub fn withdraws_payment(&self) -> bool {
        matches!(
            self.effective_status(),
            PaymentStatus::Overdue | PaymentStatus::Refunded
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionEvent {
    pub kind: SubscriptionEventKind,
    pub payload: SubscriptionPayload,
}

impl SubscriptionEvent {
    /// Status this event asks for: the kind wins, the payload status fills in.
    pub fn target_status(&self) -> Option<SubscriptionStatus> {
        use SubscriptionEventKind::*;
        match self.kind {
            Created => Some(SubscriptionStatus::Trial),
            Activated => Some(SubscriptionStatus::Active),
            Suspended | Inactivated => Some(SubscriptionStatus::Suspended),
            Canceled | Deleted => Some(SubscriptionStatus::Canceled),
            Updated => SubscriptionStatus::from_gateway(&self.payload.status),
        }
    }
}

/// Discriminated webhook body. Never both payload kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookBody {
    Payment(PaymentEvent),
    Subscription(SubscriptionEvent),
    /// Structurally valid, but a kind this system does not act on.
    Unsupported,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub event_kind: String,
    pub event_id: Option<String>,
    pub occurred_at: Option<Timestamp>,
    pub received_at: Timestamp,
    pub body: WebhookBody,
}

impl WebhookEvent {
    /// Parses and validates a raw webhook body.
    pub fn parse(bytes: &[u8], received_at: Timestamp) -> Result<Self, ValidationError> {
        let raw: RawEnvelope = serde_json::from_slice(bytes)
            .map_err(|e| ValidationError::invalid_format("envelope", e.to_string()))?;
        Self::classify(raw, received_at)
    }

    fn classify(raw: RawEnvelope, received_at: Timestamp) -> Result<Self, ValidationError> {
        let event_kind = raw.event_kind.trim().to_ascii_uppercase();
        if event_kind.is_empty() {
            return Err(ValidationError::empty_field("eventKind"));
        }
        if !raw.payload.is_object() {
            return Err(ValidationError::invalid_format(
                "payload",
                "expected a JSON object",
            ));
        }

        let body = if let Some(suffix) = event_kind.strip_prefix("PAYMENT_") {
            let payload: PaymentPayload = serde_json::from_value(raw.payload)
                .map_err(|e| ValidationError::invalid_format("payload", e.to_string()))?;
            require("payload.id", &payload.id)?;
            require("payload.customerRef", &payload.customer_ref)?;
            match PaymentEventKind::parse(suffix) {
                Some(kind) => WebhookBody::Payment(PaymentEvent { kind, payload }),
                None => WebhookBody::Unsupported,
            }
        } else if let Some(suffix) = event_kind.strip_prefix("SUBSCRIPTION_") {
            let payload: SubscriptionPayload = serde_json::from_value(raw.payload)
                .map_err(|e| ValidationError::invalid_format("payload", e.to_string()))?;
            require("payload.id", &payload.id)?;
            require("payload.customerRef", &payload.customer_ref)?;
            match SubscriptionEventKind::parse(suffix) {
                Some(kind) => WebhookBody::Subscription(SubscriptionEvent { kind, payload }),
                None => WebhookBody::Unsupported,
            }
        } else {
            WebhookBody::Unsupported
        };

        Ok(Self {
            event_kind,
            event_id: raw.event_id.filter(|id| !id.trim().is_empty()),
            occurred_at: raw.occurred_at,
            received_at,
            body,
        })
    }

    /// Time used for dates written by this event.
    pub fn effective_time(&self) -> Timestamp {
        self.occurred_at.unwrap_or(self.received_at)
    }
}

fn require(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::empty_field(field))
    } else {
        Ok(())
    }
}
