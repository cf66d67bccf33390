//! ProcessedEventLedger port - remembers webhook event ids already handled.
//!
//! Purely an optimization: every reconciliation path is idempotent without
//! it, so a ledger outage only costs redundant work.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;

/// Port for tracking processed gateway event ids.
///
/// # Example
///
/// ```ignore
/// if ledger.contains(event_id).await? {
///     return Ok(ReconciliationResult::Duplicate);
/// }
///
/// // Reconcile...
///
/// // Mark only after the event was handled
/// ledger.mark_processed(event_id).await?;
/// ```
#[async_trait]
pub trait ProcessedEventLedger: Send + Sync {
    /// True if the event id has already been processed.
    async fn contains(&self, event_id: &str) -> Result<bool, DomainError>;

    /// Record the event id as processed.
    async fn mark_processed(&self, event_id: &str) -> Result<(), DomainError>;
}
