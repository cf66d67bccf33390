//! Payment status classification.
//!
//! A payment is "paid" when the gateway reports it received or confirmed,
//! or when a credit card charge has been approved.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a charge is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingMethod {
    CreditCard,
    BankSlip,
    InstantTransfer,
    Undefined,
}

impl BillingMethod {
    /// Maps the gateway billing type string; unknown values become `Undefined`.
    pub fn from_gateway(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CREDIT_CARD" => BillingMethod::CreditCard,
            "BOLETO" | "BANK_SLIP" => BillingMethod::BankSlip,
            "PIX" | "INSTANT_TRANSFER" => BillingMethod::InstantTransfer,
            _ => BillingMethod::Undefined,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingMethod::CreditCard => "CREDIT_CARD",
            BillingMethod::BankSlip => "BANK_SLIP",
            BillingMethod::InstantTransfer => "INSTANT_TRANSFER",
            BillingMethod::Undefined => "UNDEFINED",
        }
    }
}

/// Gateway payment status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Received,
    Confirmed,
    /// Card charge authorized.
    Approved,
    Overdue,
    Refunded,
    Canceled,
    /// Any status this system does not act on; kept verbatim.
    Other(String),
}

impl PaymentStatus {
    /// Parses a gateway status string. Never fails.
    pub fn from_gateway(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "PENDING" | "AWAITING_PAYMENT" => PaymentStatus::Pending,
            "RECEIVED" | "RECEIVED_IN_CASH" => PaymentStatus::Received,
            "CONFIRMED" => PaymentStatus::Confirmed,
            "APPROVED" | "AUTHORIZED" | "APPROVED_BY_RISK_ANALYSIS" => PaymentStatus::Approved,
            "OVERDUE" => PaymentStatus::Overdue,
            "REFUNDED" | "REFUND_REQUESTED" => PaymentStatus::Refunded,
            "CANCELED" | "CANCELLED" | "DELETED" => PaymentStatus::Canceled,
            _ => PaymentStatus::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Received => "RECEIVED",
            PaymentStatus::Confirmed => "CONFIRMED",
            PaymentStatus::Approved => "APPROVED",
            PaymentStatus::Overdue => "OVERDUE",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::Canceled => "CANCELED",
            PaymentStatus::Other(raw) => raw,
        }
    }

    /// Whether this status settles the charge.
    ///
    /// `Approved` only counts for credit card charges; other methods are
    /// not settled until received or confirmed.
    pub fn is_paid(&self, method: BillingMethod) -> bool {
        match self {
            PaymentStatus::Received | PaymentStatus::Confirmed => true,
            PaymentStatus::Approved => method == BillingMethod::CreditCard,
            _ => false,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
