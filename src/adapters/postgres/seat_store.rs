//! PostgreSQL implementation of SeatStore.
//!
//! The one-pending-seat-per-(account, e-mail) rule is the
//! `pending_seats_account_email_key` unique constraint; reservation is an
//! `INSERT ... ON CONFLICT DO NOTHING` so concurrent requests cannot both win.

use crate::domain::billing::{
    BillingMethod, PaymentStatus, PendingSeat, Seat, SeatBilling, SeatCandidate,
};
use crate::domain::foundation::{
    AccountId, CandidateId, DomainError, Email, ErrorCode, PendingSeatId, SeatId, Timestamp,
};
use crate::ports::{ReserveOutcome, SeatStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const PENDING_COLUMNS: &str = r#"
    SELECT id, account_id, candidate_id, candidate_email, candidate_name,
           external_payment_id, external_subscription_id, payment_status,
           payment_method, created_at, deadline
    FROM pending_seats
"#;

const SEAT_COLUMNS: &str = r#"
    SELECT id, account_id, candidate_id, email, name, external_subscription_id,
           billing, created_at, updated_at
    FROM seats
"#;

pub struct PostgresSeatStore {
    pool: PgPool,
}

impl PostgresSeatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn pending_where(
        &self,
        column: &str,
        value: String,
    ) -> Result<Option<PendingSeat>, DomainError> {
        let sql = format!("{} WHERE {} = $1", PENDING_COLUMNS, column);
        let row: Option<PendingSeatRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find pending seat", e))?;

        row.map(PendingSeat::try_from).transpose()
    }

    async fn seat_where(&self, column: &str, value: String) -> Result<Option<Seat>, DomainError> {
        let sql = format!("{} WHERE {} = $1", SEAT_COLUMNS, column);
        let row: Option<SeatRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find seat", e))?;

        row.map(Seat::try_from).transpose()
    }
}

fn db_error(action: &str, e: sqlx::Error) -> DomainError {
    DomainError::database(format!("Failed to {}: {}", action, e))
}

fn corrupt(table: &str, field: &str, e: impl std::fmt::Display) -> DomainError {
    DomainError::database(format!("Invalid {} in {}: {}", field, table, e))
}

#[derive(Debug, sqlx::FromRow)]
struct PendingSeatRow {
    id: Uuid,
    account_id: Uuid,
    candidate_id: String,
    candidate_email: String,
    candidate_name: String,
    external_payment_id: Option<String>,
    external_subscription_id: Option<String>,
    payment_status: Option<String>,
    payment_method: String,
    created_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
}

impl TryFrom<PendingSeatRow> for PendingSeat {
    type Error = DomainError;

    fn try_from(row: PendingSeatRow) -> Result<Self, Self::Error> {
        let candidate = SeatCandidate::new(
            row.candidate_id,
            &row.candidate_email,
            row.candidate_name,
        )
        .map_err(|e| corrupt("pending_seats", "candidate", e))?;

        Ok(PendingSeat {
            id: PendingSeatId::from_uuid(row.id),
            account_id: AccountId::from_uuid(row.account_id),
            candidate,
            external_payment_id: row.external_payment_id,
            external_subscription_id: row.external_subscription_id,
            payment_status: row.payment_status.as_deref().map(PaymentStatus::from_gateway),
            payment_method: BillingMethod::from_gateway(&row.payment_method),
            created_at: Timestamp::from_datetime(row.created_at),
            deadline: Timestamp::from_datetime(row.deadline),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SeatRow {
    id: Uuid,
    account_id: Option<Uuid>,
    candidate_id: String,
    email: String,
    name: String,
    external_subscription_id: Option<String>,
    billing: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SeatRow> for Seat {
    type Error = DomainError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        Ok(Seat {
            id: SeatId::from_uuid(row.id),
            account_id: row.account_id.map(AccountId::from_uuid),
            candidate_id: CandidateId::new(row.candidate_id)
                .map_err(|e| corrupt("seats", "candidate_id", e))?,
            email: Email::parse(&row.email).map_err(|e| corrupt("seats", "email", e))?,
            name: row.name,
            external_subscription_id: row.external_subscription_id,
            billing: row
                .billing
                .parse::<SeatBilling>()
                .map_err(|e| corrupt("seats", "billing", e))?,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[async_trait]
impl SeatStore for PostgresSeatStore {
    async fn reserve_pending(&self, pending: &PendingSeat) -> Result<ReserveOutcome, DomainError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO pending_seats (
                id, account_id, candidate_id, candidate_email, candidate_name,
                external_payment_id, external_subscription_id, payment_status,
                payment_method, created_at, deadline
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (account_id, candidate_email) DO NOTHING
            "#,
        )
        .bind(pending.id.as_uuid())
        .bind(pending.account_id.as_uuid())
        .bind(pending.candidate.candidate_id.as_str())
        .bind(pending.candidate.email.as_str())
        .bind(&pending.candidate.name)
        .bind(&pending.external_payment_id)
        .bind(&pending.external_subscription_id)
        .bind(pending.payment_status.as_ref().map(|s| s.as_str().to_string()))
        .bind(pending.payment_method.as_str())
        .bind(pending.created_at.as_datetime())
        .bind(pending.deadline.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("reserve pending seat", e))?;

        if inserted.rows_affected() == 1 {
            return Ok(ReserveOutcome::Inserted);
        }

        let sql = format!("{} WHERE account_id = $1 AND candidate_email = $2", PENDING_COLUMNS);
        let existing: Option<PendingSeatRow> = sqlx::query_as(&sql)
            .bind(pending.account_id.as_uuid())
            .bind(pending.candidate.email.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find pending seat", e))?;

        match existing {
            Some(row) => Ok(ReserveOutcome::Existing(PendingSeat::try_from(row)?)),
            // The holder was deleted between our insert and read.
            None => Err(DomainError::new(
                ErrorCode::VersionConflict,
                "Pending seat reservation raced with a cancellation; retry",
            )),
        }
    }

    async fn update_pending(&self, pending: &PendingSeat) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_seats SET
                external_payment_id = $2,
                external_subscription_id = $3,
                payment_status = $4,
                deadline = $5
            WHERE id = $1
            "#,
        )
        .bind(pending.id.as_uuid())
        .bind(&pending.external_payment_id)
        .bind(&pending.external_subscription_id)
        .bind(pending.payment_status.as_ref().map(|s| s.as_str().to_string()))
        .bind(pending.deadline.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update pending seat", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::SeatNotFound,
                "Pending seat not found",
            ));
        }
        Ok(())
    }

    async fn delete_pending(&self, id: &PendingSeatId) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM pending_seats WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("delete pending seat", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_pending(&self, id: &PendingSeatId) -> Result<Option<PendingSeat>, DomainError> {
        let sql = format!("{} WHERE id = $1", PENDING_COLUMNS);
        let row: Option<PendingSeatRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find pending seat", e))?;

        row.map(PendingSeat::try_from).transpose()
    }

    async fn find_pending_by_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<PendingSeat>, DomainError> {
        self.pending_where("external_payment_id", payment_id.to_string())
            .await
    }

    async fn find_pending_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<PendingSeat>, DomainError> {
        self.pending_where("external_subscription_id", subscription_id.to_string())
            .await
    }

    async fn save_seat(&self, seat: &Seat) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO seats (
                id, account_id, candidate_id, email, name, external_subscription_id,
                billing, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (candidate_id) DO UPDATE SET
                account_id = EXCLUDED.account_id,
                email = EXCLUDED.email,
                name = EXCLUDED.name,
                external_subscription_id = EXCLUDED.external_subscription_id,
                billing = EXCLUDED.billing,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(seat.id.as_uuid())
        .bind(seat.account_id.map(|id| *id.as_uuid()))
        .bind(seat.candidate_id.as_str())
        .bind(seat.email.as_str())
        .bind(&seat.name)
        .bind(&seat.external_subscription_id)
        .bind(seat.billing.as_str())
        .bind(seat.created_at.as_datetime())
        .bind(seat.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("save seat", e))?;

        Ok(())
    }

    async fn find_seat_by_candidate(
        &self,
        candidate_id: &CandidateId,
    ) -> Result<Option<Seat>, DomainError> {
        self.seat_where("candidate_id", candidate_id.as_str().to_string())
            .await
    }

    async fn find_seat_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Seat>, DomainError> {
        self.seat_where("external_subscription_id", subscription_id.to_string())
            .await
    }

    async fn list_seats(&self, account_id: &AccountId) -> Result<Vec<Seat>, DomainError> {
        let sql = format!(
            "{} WHERE account_id = $1 AND billing <> 'removed' ORDER BY created_at ASC",
            SEAT_COLUMNS
        );
        let rows: Vec<SeatRow> = sqlx::query_as(&sql)
            .bind(account_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list seats", e))?;

        rows.into_iter().map(Seat::try_from).collect()
    }
}
