//! Payment notification port.

use crate::domain::billing::Account;
use crate::domain::foundation::DomainError;
use async_trait::async_trait;

/// Sends billing notifications to account owners.
///
/// Callers fire and forget: a failed notification never fails the
/// operation that triggered it.
#[async_trait]
pub trait PaymentNotifier: Send + Sync {
    /// The account's subscription payment was confirmed.
    async fn payment_confirmed(&self, account: &Account) -> Result<(), DomainError>;
}
