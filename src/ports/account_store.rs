//! Account store port.
//!
//! Keyed by internal id with unique lookups on gateway customer id, gateway
//! subscription id and e-mail. Updates are version checked: the caller passes
//! the account as it read it and the store rejects the write with
//! `VersionConflict` if another writer got there first.

use crate::domain::billing::Account;
use crate::domain::foundation::{AccountId, DomainError, Email};
use async_trait::async_trait;

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if id, e-mail or a gateway id is taken
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, account: &Account) -> Result<(), DomainError>;

    /// Write `account` if the stored version still equals `account.version`.
    ///
    /// Returns the new version.
    ///
    /// # Errors
    ///
    /// - `AccountNotFound` if the account doesn't exist
    /// - `VersionConflict` if the stored version moved on
    /// - `AlreadyExists` if a gateway id collides with another account
    async fn update(&self, account: &Account) -> Result<i64, DomainError>;

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, DomainError>;

    async fn find_by_customer_id(&self, customer_id: &str)
        -> Result<Option<Account>, DomainError>;

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Account>, DomainError>;

    async fn find_by_email(&self, email: &Email) -> Result<Option<Account>, DomainError>;

    /// Hard delete. Only the registration rollback calls this.
    async fn delete(&self, id: &AccountId) -> Result<(), DomainError>;
}
