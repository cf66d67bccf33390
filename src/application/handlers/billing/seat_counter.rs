//! Seat recount.
//!
//! The account's seat count is always written from a count of the seats
//! currently billed to it, never adjusted by +1/-1.

use std::sync::Arc;

use crate::application::account_writer::{AccountGuard, AccountWriter};
use crate::domain::billing::Account;
use crate::domain::foundation::{AccountId, DomainError};
use crate::ports::SeatStore;

#[derive(Clone)]
pub struct SeatCounter {
    seats: Arc<dyn SeatStore>,
    writer: AccountWriter,
}

impl SeatCounter {
    pub fn new(seats: Arc<dyn SeatStore>, writer: AccountWriter) -> Self {
        Self { seats, writer }
    }

    /// Number of seats billing against the account right now.
    pub async fn count_billed(&self, account_id: &AccountId) -> Result<u32, DomainError> {
        let seats = self.seats.list_seats(account_id).await?;
        let billed = seats.iter().filter(|s| s.is_billed_to(account_id)).count();
        Ok(u32::try_from(billed).unwrap_or(u32::MAX))
    }

    /// Recounts and stores the seat total and plan tier.
    pub async fn recount(&self, account_id: AccountId) -> Result<Account, DomainError> {
        let guard = self.writer.locks().lock(account_id).await;
        self.recount_held(&guard, account_id).await
    }

    pub async fn recount_held(
        &self,
        guard: &AccountGuard,
        account_id: AccountId,
    ) -> Result<Account, DomainError> {
        let billed = self.count_billed(&account_id).await?;
        let modified = self
            .writer
            .modify_held(guard, account_id, |account| account.sync_seats(billed))
            .await?;

        if modified.written {
            tracing::info!(
                account_id = %account_id,
                seat_count = billed,
                plan = %modified.account.plan,
                "Seat count recomputed"
            );
        }
        Ok(modified.account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryAccountStore, InMemorySeatStore};
    use crate::application::account_writer::AccountLocks;
    use crate::domain::billing::{PlanTier, Seat, SeatCandidate};
    use crate::domain::foundation::Email;
    use crate::ports::AccountStore;

    #[tokio::test]
    async fn recount_counts_only_active_seats() {
        let accounts = Arc::new(InMemoryAccountStore::new());
        let seats = Arc::new(InMemorySeatStore::new());
        let account = Account::register(AccountId::new(), Email::parse("o@example.com").unwrap());
        accounts.insert(&account).await.unwrap();

        for (i, suspended) in [(1, false), (2, false), (3, true)] {
            let candidate =
                SeatCandidate::new(format!("cand-{}", i), format!("s{}@example.com", i), "Seat")
                    .unwrap();
            let mut seat = Seat::promote(account.id, candidate, None);
            if suspended {
                seat.suspend().unwrap();
            }
            seats.save_seat(&seat).await.unwrap();
        }

        let counter = SeatCounter::new(
            seats,
            AccountWriter::new(accounts, AccountLocks::new()),
        );
        let updated = counter.recount(account.id).await.unwrap();

        assert_eq!(updated.seat_count, 2);
        assert_eq!(updated.plan, PlanTier::Team);
    }
}
