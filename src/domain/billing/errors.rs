//! Billing error taxonomy.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | Validation | 400 |
//! | NotFound | 404 |
//! | AlreadyLinked | 409 |
//! | NotLinked | 409 |
//! | GatewayUnavailable | 503 |
//! | CheckoutFailed | 503 |
//! | RegistrationRolledBack | 410 |
//! | Inconsistent | 500 |
//! | Infrastructure | 500 |

use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    /// Malformed input. Rejected before any side effect.
    #[error("validation failed on '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Network or remote failure. Nothing local was committed.
    #[error("payment gateway unavailable: {message}")]
    GatewayUnavailable { message: String, retryable: bool },

    /// The candidate already holds a seat, or a purchase is in flight.
    #[error("candidate {candidate} is already linked")]
    AlreadyLinked { candidate: String },

    #[error("seat for candidate {candidate} is not linked to an account")]
    NotLinked { candidate: String },

    /// A reconciliation branch could not safely resolve its target.
    #[error("inconsistent billing state: {0}")]
    Inconsistent(String),

    /// First checkout failed and the registration was undone.
    #[error("registration could not be completed, please register again: {reason}")]
    RegistrationRolledBack { reason: String },

    /// A repeat checkout failed; account history is intact.
    #[error("checkout failed, please retry: {reason}")]
    CheckoutFailed { reason: String },

    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl BillingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        BillingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn already_linked(candidate: impl ToString) -> Self {
        BillingError::AlreadyLinked {
            candidate: candidate.to_string(),
        }
    }

    pub fn not_linked(candidate: impl ToString) -> Self {
        BillingError::NotLinked {
            candidate: candidate.to_string(),
        }
    }

    pub fn inconsistent(message: impl Into<String>) -> Self {
        BillingError::Inconsistent(message.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        BillingError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            BillingError::Validation { .. } => ErrorCode::ValidationFailed,
            BillingError::NotFound { .. } => ErrorCode::NotFound,
            BillingError::GatewayUnavailable { .. } => ErrorCode::GatewayUnavailable,
            BillingError::AlreadyLinked { .. } => ErrorCode::AlreadyLinked,
            BillingError::NotLinked { .. } => ErrorCode::NotLinked,
            BillingError::Inconsistent(_) => ErrorCode::Inconsistent,
            BillingError::RegistrationRolledBack { .. } => ErrorCode::RegistrationRolledBack,
            BillingError::CheckoutFailed { .. } => ErrorCode::CheckoutFailed,
            BillingError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Whether the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            BillingError::GatewayUnavailable { retryable, .. } => *retryable,
            BillingError::CheckoutFailed { .. } | BillingError::Infrastructure(_) => true,
            _ => false,
        }
    }
}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        BillingError::Validation {
            field: err.field().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed
            | ErrorCode::EmptyField
            | ErrorCode::OutOfRange
            | ErrorCode::InvalidFormat => BillingError::Validation {
                field: err.details.get("field").cloned().unwrap_or_default(),
                message: err.message,
            },
            ErrorCode::AlreadyLinked => BillingError::AlreadyLinked {
                candidate: err.details.get("candidate").cloned().unwrap_or_default(),
            },
            ErrorCode::Inconsistent => BillingError::Inconsistent(err.message),
            _ => BillingError::Infrastructure(err.to_string()),
        }
    }
}

impl From<BillingError> for DomainError {
    fn from(err: BillingError) -> Self {
        DomainError::new(err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_taxonomy() {
        assert_eq!(
            BillingError::already_linked("cand").code(),
            ErrorCode::AlreadyLinked
        );
        assert_eq!(BillingError::not_linked("cand").code(), ErrorCode::NotLinked);
        assert_eq!(
            BillingError::inconsistent("seat lost").code(),
            ErrorCode::Inconsistent
        );
    }

    #[test]
    fn gateway_retryability_is_carried() {
        let timeout = BillingError::GatewayUnavailable {
            message: "timed out".into(),
            retryable: true,
        };
        let rejected = BillingError::GatewayUnavailable {
            message: "bad card".into(),
            retryable: false,
        };
        assert!(timeout.is_retryable());
        assert!(!rejected.is_retryable());
    }

    #[test]
    fn rollback_is_not_retryable_but_checkout_failure_is() {
        assert!(!BillingError::RegistrationRolledBack { reason: "x".into() }.is_retryable());
        assert!(BillingError::CheckoutFailed { reason: "x".into() }.is_retryable());
    }

    #[test]
    fn validation_error_converts() {
        let err: BillingError = ValidationError::empty_field("email").into();
        assert!(matches!(err, BillingError::Validation { ref field, .. } if field == "email"));
    }

    #[test]
    fn database_error_becomes_infrastructure() {
        let err: BillingError = DomainError::database("connection reset").into();
        assert!(matches!(err, BillingError::Infrastructure(_)));
    }
}
