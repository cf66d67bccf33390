//! In-memory account store.
//!
//! Enforces the same unique keys and version check as the PostgreSQL store,
//! so handlers behave identically in tests and local runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::Account;
use crate::domain::foundation::{AccountId, DomainError, Email, ErrorCode};
use crate::ports::AccountStore;

#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<HashMap<AccountId, Account>>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }

    fn collides(existing: &Account, candidate: &Account) -> Option<&'static str> {
        if existing.id == candidate.id {
            return None;
        }
        if existing.email == candidate.email {
            return Some("email");
        }
        if candidate.external_customer_id.is_some()
            && existing.external_customer_id == candidate.external_customer_id
        {
            return Some("external_customer_id");
        }
        if candidate.external_subscription_id.is_some()
            && existing.external_subscription_id == candidate.external_subscription_id
        {
            return Some("external_subscription_id");
        }
        None
    }

    fn check_unique(
        accounts: &HashMap<AccountId, Account>,
        candidate: &Account,
    ) -> Result<(), DomainError> {
        for existing in accounts.values() {
            if let Some(field) = Self::collides(existing, candidate) {
                return Err(DomainError::new(
                    ErrorCode::AlreadyExists,
                    format!("Another account already uses this {}", field),
                )
                .with_detail("field", field));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn insert(&self, account: &Account) -> Result<(), DomainError> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.id) {
            return Err(DomainError::new(
                ErrorCode::AlreadyExists,
                "Account already exists",
            ));
        }
        Self::check_unique(&accounts, account)?;
        accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn update(&self, account: &Account) -> Result<i64, DomainError> {
        let mut accounts = self.accounts.write().await;
        let stored_version = accounts
            .get(&account.id)
            .map(|a| a.version)
            .ok_or_else(|| DomainError::new(ErrorCode::AccountNotFound, "Account not found"))?;

        if stored_version != account.version {
            return Err(DomainError::new(
                ErrorCode::VersionConflict,
                format!(
                    "Account {} was modified concurrently (expected version {}, found {})",
                    account.id, account.version, stored_version
                ),
            ));
        }
        Self::check_unique(&accounts, account)?;

        let mut updated = account.clone();
        updated.version = stored_version + 1;
        accounts.insert(account.id, updated);
        Ok(stored_version + 1)
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, DomainError> {
        Ok(self.accounts.read().await.get(id).cloned())
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<Account>, DomainError> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|a| a.external_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Account>, DomainError> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|a| a.external_subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<Account>, DomainError> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|a| &a.email == email)
            .cloned())
    }

    async fn delete(&self, id: &AccountId) -> Result<(), DomainError> {
        self.accounts
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| DomainError::new(ErrorCode::AccountNotFound, "Account not found"))
    }
}
