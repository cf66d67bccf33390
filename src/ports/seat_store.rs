//! Seat store port - pending seat reservations and promoted seats.

use crate::domain::billing::{PendingSeat, Seat};
use crate::domain::foundation::{AccountId, CandidateId, DomainError, PendingSeatId};
use async_trait::async_trait;

/// Result of reserving a pending seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// The reservation is ours.
    Inserted,
    /// Another pending seat already holds (account, candidate email).
    Existing(PendingSeat),
}

/// Persistence for seats.
///
/// Implementations must enforce:
/// - at most one pending seat per (account, candidate email), atomically
/// - at most one seat record per candidate
#[async_trait]
pub trait SeatStore: Send + Sync {
    /// Atomically reserve a pending seat for (account, candidate email).
    async fn reserve_pending(&self, pending: &PendingSeat) -> Result<ReserveOutcome, DomainError>;

    async fn update_pending(&self, pending: &PendingSeat) -> Result<(), DomainError>;

    /// Returns false if nothing was deleted.
    async fn delete_pending(&self, id: &PendingSeatId) -> Result<bool, DomainError>;

    async fn find_pending(&self, id: &PendingSeatId) -> Result<Option<PendingSeat>, DomainError>;

    async fn find_pending_by_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<PendingSeat>, DomainError>;

    async fn find_pending_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<PendingSeat>, DomainError>;

    /// Insert or replace the seat record for its candidate.
    async fn save_seat(&self, seat: &Seat) -> Result<(), DomainError>;

    async fn find_seat_by_candidate(
        &self,
        candidate_id: &CandidateId,
    ) -> Result<Option<Seat>, DomainError>;

    async fn find_seat_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Seat>, DomainError>;

    /// Seats linked to the account, active or suspended.
    async fn list_seats(&self, account_id: &AccountId) -> Result<Vec<Seat>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn SeatStore) {}
    }
}
