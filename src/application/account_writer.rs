//! Single writer per account.
//!
//! Every mutation of an account's billing fields goes through
//! [`AccountWriter::modify`]: it takes the account's in-process lock, reads
//! the account fresh from the store, applies the mutation and writes it back
//! with the store's version check. Another process racing on the same row
//! surfaces as `VersionConflict`, and the mutation is re-run on fresh state.
//!
//! The lock is only held around the read-modify-write, never across a
//! gateway call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use crate::domain::billing::Account;
use crate::domain::foundation::{AccountId, DomainError, ErrorCode};
use crate::ports::AccountStore;

const MAX_CONFLICT_RETRIES: usize = 3;

/// Registry of per-account async mutexes.
#[derive(Default, Clone)]
pub struct AccountLocks {
    locks: Arc<Mutex<HashMap<AccountId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `account_id`.
    pub async fn lock(&self, account_id: AccountId) -> AccountGuard {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop entries nobody holds or waits on.
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            locks.entry(account_id).or_default().clone()
        };
        AccountGuard {
            _guard: mutex.lock_owned().await,
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

pub struct AccountGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Outcome of a read-modify-write.
#[derive(Debug, Clone)]
pub struct Modified<T> {
    /// The account as stored after the call.
    pub account: Account,
    /// False when the mutation left the account untouched and nothing was written.
    pub written: bool,
    pub value: T,
}

#[derive(Clone)]
pub struct AccountWriter {
    store: Arc<dyn AccountStore>,
    locks: AccountLocks,
}

impl AccountWriter {
    pub fn new(store: Arc<dyn AccountStore>, locks: AccountLocks) -> Self {
        Self { store, locks }
    }

    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }

    pub fn locks(&self) -> &AccountLocks {
        &self.locks
    }

    /// Applies `mutate` to fresh account state and persists the result.
    ///
    /// `mutate` may run more than once if a concurrent writer wins the
    /// version check, so it must be a pure function of the account it is
    /// given. Returns `AccountNotFound` if the account does not exist.
    pub async fn modify<T, F>(&self, account_id: AccountId, mutate: F) -> Result<Modified<T>, DomainError>
    where
        F: FnMut(&mut Account) -> T,
    {
        let guard = self.locks.lock(account_id).await;
        self.modify_held(&guard, account_id, mutate).await
    }

    /// Same as [`modify`](Self::modify) for a caller already holding the
    /// account's lock, e.g. to read seat state under it first.
    pub async fn modify_held<T, F>(
        &self,
        _guard: &AccountGuard,
        account_id: AccountId,
        mut mutate: F,
    ) -> Result<Modified<T>, DomainError>
    where
        F: FnMut(&mut Account) -> T,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let original = self
                .store
                .find_by_id(&account_id)
                .await?
                .ok_or_else(|| DomainError::new(ErrorCode::AccountNotFound, "Account not found"))?;

            let mut account = original.clone();
            let value = mutate(&mut account);

            if account == original {
                return Ok(Modified {
                    account,
                    written: false,
                    value,
                });
            }

            match self.store.update(&account).await {
                Ok(version) => {
                    account.version = version;
                    return Ok(Modified {
                        account,
                        written: true,
                        value,
                    });
                }
                Err(e) if e.code == ErrorCode::VersionConflict && attempt < MAX_CONFLICT_RETRIES => {
                    tracing::debug!(account_id = %account_id, attempt, "Account version conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryAccountStore;
    use crate::domain::foundation::Email;
    use std::time::Duration;

    async fn setup() -> (AccountWriter, AccountId) {
        let store = Arc::new(InMemoryAccountStore::new());
        let account = Account::register(AccountId::new(), Email::parse("o@example.com").unwrap());
        store.insert(&account).await.unwrap();
        (AccountWriter::new(store, AccountLocks::new()), account.id)
    }

    #[tokio::test]
    async fn modify_writes_and_bumps_version() {
        let (writer, id) = setup().await;

        let modified = writer.modify(id, |a| a.sync_seats(2)).await.unwrap();

        assert!(modified.written);
        assert!(modified.value);
        assert_eq!(modified.account.version, 1);
        assert_eq!(modified.account.seat_count, 2);
    }

    #[tokio::test]
    async fn noop_mutation_skips_write() {
        let (writer, id) = setup().await;

        let modified = writer.modify(id, |_| ()).await.unwrap();

        assert!(!modified.written);
        assert_eq!(modified.account.version, 0);
    }

    #[tokio::test]
    async fn missing_account_is_not_found() {
        let (writer, _) = setup().await;

        let err = writer.modify(AccountId::new(), |_| ()).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::AccountNotFound);
    }

    #[tokio::test]
    async fn concurrent_writers_do_not_lose_updates() {
        let (writer, id) = setup().await;

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let writer = writer.clone();
            tasks.push(tokio::spawn(async move {
                writer
                    .modify(id, |a| {
                        let next = a.seat_count + 1;
                        a.sync_seats(next)
                    })
                    .await
                    .unwrap()
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let stored = writer.store().find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.seat_count, 10);
        assert_eq!(stored.version, 10);
    }

    #[tokio::test]
    async fn lock_serializes_same_account() {
        let locks = AccountLocks::new();
        let id = AccountId::new();

        let guard = locks.lock(id).await;
        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock(id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn released_locks_are_pruned() {
        let locks = AccountLocks::new();
        drop(locks.lock(AccountId::new()).await);
        drop(locks.lock(AccountId::new()).await);

        assert_eq!(locks.tracked(), 1);
    }
}
