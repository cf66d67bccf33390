//! In-memory seat store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{PendingSeat, Seat};
use crate::domain::foundation::{
    AccountId, CandidateId, DomainError, ErrorCode, PendingSeatId,
};
use crate::ports::{ReserveOutcome, SeatStore};

#[derive(Default)]
struct SeatTables {
    pending: HashMap<PendingSeatId, PendingSeat>,
    seats: HashMap<CandidateId, Seat>,
}

#[derive(Default, Clone)]
pub struct InMemorySeatStore {
    tables: Arc<RwLock<SeatTables>>,
}

impl InMemorySeatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn pending_count(&self) -> usize {
        self.tables.read().await.pending.len()
    }
}

#[async_trait]
impl SeatStore for InMemorySeatStore {
    async fn reserve_pending(&self, pending: &PendingSeat) -> Result<ReserveOutcome, DomainError> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .pending
            .values()
            .find(|p| {
                p.account_id == pending.account_id
                    && p.candidate.email == pending.candidate.email
            })
            .cloned();

        if let Some(existing) = existing {
            return Ok(ReserveOutcome::Existing(existing));
        }
        tables.pending.insert(pending.id, pending.clone());
        Ok(ReserveOutcome::Inserted)
    }

    async fn update_pending(&self, pending: &PendingSeat) -> Result<(), DomainError> {
        let mut tables = self.tables.write().await;
        match tables.pending.get_mut(&pending.id) {
            Some(slot) => {
                *slot = pending.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::SeatNotFound,
                "Pending seat not found",
            )),
        }
    }

    async fn delete_pending(&self, id: &PendingSeatId) -> Result<bool, DomainError> {
        Ok(self.tables.write().await.pending.remove(id).is_some())
    }

    async fn find_pending(&self, id: &PendingSeatId) -> Result<Option<PendingSeat>, DomainError> {
        Ok(self.tables.read().await.pending.get(id).cloned())
    }

    async fn find_pending_by_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<PendingSeat>, DomainError> {
        Ok(self
            .tables
            .read()
            .await
            .pending
            .values()
            .find(|p| p.external_payment_id.as_deref() == Some(payment_id))
            .cloned())
    }

    async fn find_pending_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<PendingSeat>, DomainError> {
        Ok(self
            .tables
            .read()
            .await
            .pending
            .values()
            .find(|p| p.external_subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }

    async fn save_seat(&self, seat: &Seat) -> Result<(), DomainError> {
        self.tables
            .write()
            .await
            .seats
            .insert(seat.candidate_id.clone(), seat.clone());
        Ok(())
    }

    async fn find_seat_by_candidate(
        &self,
        candidate_id: &CandidateId,
    ) -> Result<Option<Seat>, DomainError> {
        Ok(self.tables.read().await.seats.get(candidate_id).cloned())
    }

    async fn find_seat_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Seat>, DomainError> {
        Ok(self
            .tables
            .read()
            .await
            .seats
            .values()
            .find(|s| s.external_subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }

    async fn list_seats(&self, account_id: &AccountId) -> Result<Vec<Seat>, DomainError> {
        let mut seats: Vec<Seat> = self
            .tables
            .read()
            .await
            .seats
            .values()
            .filter(|s| s.account_id.as_ref() == Some(account_id) && s.is_linked())
            .cloned()
            .collect();
        seats.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(seats)
    }
}
