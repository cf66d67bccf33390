//! PostgreSQL implementation of AccountStore.

use crate::domain::billing::{Account, PaymentStatus, PlanTier, SubscriptionStatus};
use crate::domain::foundation::{AccountId, DomainError, Email, ErrorCode, Timestamp};
use crate::ports::AccountStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const SELECT_COLUMNS: &str = r#"
    SELECT id, email, external_customer_id, external_subscription_id, status, plan,
           subscription_start, subscription_end, seat_count, last_payment_status,
           status_changed_at, held_transitions, version, created_at, updated_at
    FROM billing_accounts
"#;

pub struct PostgresAccountStore {
    pool: PgPool,
}

impl PostgresAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        predicate: &str,
        value: impl for<'q> sqlx::Encode<'q, sqlx::Postgres> + sqlx::Type<sqlx::Postgres> + Send,
    ) -> Result<Option<Account>, DomainError> {
        let sql = format!("{} WHERE {} = $1", SELECT_COLUMNS, predicate);
        let row: Option<AccountRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to find account: {}", e)))?;

        row.map(Account::try_from).transpose()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    external_customer_id: Option<String>,
    external_subscription_id: Option<String>,
    status: String,
    plan: String,
    subscription_start: Option<DateTime<Utc>>,
    subscription_end: Option<DateTime<Utc>>,
    seat_count: i32,
    last_payment_status: Option<String>,
    status_changed_at: Option<DateTime<Utc>>,
    held_transitions: serde_json::Value,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = DomainError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str, e: &dyn std::fmt::Display| {
            DomainError::database(format!("Invalid {} in billing_accounts: {}", field, e))
        };

        Ok(Account {
            id: AccountId::from_uuid(row.id),
            email: Email::parse(&row.email).map_err(|e| corrupt("email", &e))?,
            external_customer_id: row.external_customer_id,
            external_subscription_id: row.external_subscription_id,
            status: row
                .status
                .parse::<SubscriptionStatus>()
                .map_err(|e| corrupt("status", &e))?,
            plan: row.plan.parse::<PlanTier>().map_err(|e| corrupt("plan", &e))?,
            subscription_start: row.subscription_start.map(Timestamp::from_datetime),
            subscription_end: row.subscription_end.map(Timestamp::from_datetime),
            seat_count: u32::try_from(row.seat_count).map_err(|e| corrupt("seat_count", &e))?,
            last_payment_status: row
                .last_payment_status
                .as_deref()
                .map(PaymentStatus::from_gateway),
            status_changed_at: row.status_changed_at.map(Timestamp::from_datetime),
            held_transitions: serde_json::from_value(row.held_transitions)
                .map_err(|e| corrupt("held_transitions", &e))?,
            version: row.version,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn seat_count_param(account: &Account) -> Result<i32, DomainError> {
    i32::try_from(account.seat_count)
        .map_err(|_| DomainError::validation("seat_count", "Seat count exceeds storage range"))
}

fn held_transitions_param(account: &Account) -> Result<serde_json::Value, DomainError> {
    serde_json::to_value(&account.held_transitions)
        .map_err(|e| DomainError::database(format!("Failed to encode held transitions: {}", e)))
}

fn map_unique_violation(e: sqlx::Error, action: &str) -> DomainError {
    if let sqlx::Error::Database(db_err) = &e {
        if let Some(constraint) = db_err.constraint() {
            let field = match constraint {
                "billing_accounts_email_key" => Some("email"),
                "billing_accounts_external_customer_id_key" => Some("external_customer_id"),
                "billing_accounts_external_subscription_id_key" => {
                    Some("external_subscription_id")
                }
                "billing_accounts_pkey" => Some("id"),
                _ => None,
            };
            if let Some(field) = field {
                return DomainError::new(
                    ErrorCode::AlreadyExists,
                    format!("Another account already uses this {}", field),
                )
                .with_detail("field", field);
            }
        }
    }
    DomainError::database(format!("Failed to {} account: {}", action, e))
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    async fn insert(&self, account: &Account) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO billing_accounts (
                id, email, external_customer_id, external_subscription_id, status, plan,
                subscription_start, subscription_end, seat_count, last_payment_status,
                status_changed_at, held_transitions, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(account.email.as_str())
        .bind(&account.external_customer_id)
        .bind(&account.external_subscription_id)
        .bind(account.status.as_str())
        .bind(account.plan.as_str())
        .bind(account.subscription_start.map(|t| *t.as_datetime()))
        .bind(account.subscription_end.map(|t| *t.as_datetime()))
        .bind(seat_count_param(account)?)
        .bind(account.last_payment_status.as_ref().map(|s| s.as_str().to_string()))
        .bind(account.status_changed_at.map(|t| *t.as_datetime()))
        .bind(held_transitions_param(account)?)
        .bind(account.version)
        .bind(account.created_at.as_datetime())
        .bind(account.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "insert"))?;

        Ok(())
    }

    async fn update(&self, account: &Account) -> Result<i64, DomainError> {
        let new_version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE billing_accounts SET
                email = $3,
                external_customer_id = $4,
                external_subscription_id = $5,
                status = $6,
                plan = $7,
                subscription_start = $8,
                subscription_end = $9,
                seat_count = $10,
                last_payment_status = $11,
                status_changed_at = $12,
                held_transitions = $13,
                updated_at = $14,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING version
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(account.version)
        .bind(account.email.as_str())
        .bind(&account.external_customer_id)
        .bind(&account.external_subscription_id)
        .bind(account.status.as_str())
        .bind(account.plan.as_str())
        .bind(account.subscription_start.map(|t| *t.as_datetime()))
        .bind(account.subscription_end.map(|t| *t.as_datetime()))
        .bind(seat_count_param(account)?)
        .bind(account.last_payment_status.as_ref().map(|s| s.as_str().to_string()))
        .bind(account.status_changed_at.map(|t| *t.as_datetime()))
        .bind(held_transitions_param(account)?)
        .bind(account.updated_at.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "update"))?;

        if let Some(version) = new_version {
            return Ok(version);
        }

        // Zero rows: either the account is gone or the version moved on.
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM billing_accounts WHERE id = $1)")
                .bind(account.id.as_uuid())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| DomainError::database(format!("Failed to update account: {}", e)))?;

        if exists {
            Err(DomainError::new(
                ErrorCode::VersionConflict,
                format!(
                    "Account {} was modified concurrently (expected version {})",
                    account.id, account.version
                ),
            ))
        } else {
            Err(DomainError::new(ErrorCode::AccountNotFound, "Account not found"))
        }
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, DomainError> {
        self.fetch_one_where("id", *id.as_uuid()).await
    }

    async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<Account>, DomainError> {
        self.fetch_one_where("external_customer_id", customer_id.to_string())
            .await
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Account>, DomainError> {
        self.fetch_one_where("external_subscription_id", subscription_id.to_string())
            .await
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<Account>, DomainError> {
        self.fetch_one_where("email", email.as_str().to_string())
            .await
    }

    async fn delete(&self, id: &AccountId) -> Result<(), DomainError> {
        let result = sqlx::query("DELETE FROM billing_accounts WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to delete account: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(ErrorCode::AccountNotFound, "Account not found"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> AccountRow {
        let now = Utc::now();
        AccountRow {
            id: Uuid::new_v4(),
            email: "owner@example.com".to_string(),
            external_customer_id: Some("cus_1".to_string()),
            external_subscription_id: None,
            status: "past_due".to_string(),
            plan: "team".to_string(),
            subscription_start: Some(now),
            subscription_end: None,
            seat_count: 3,
            last_payment_status: Some("OVERDUE".to_string()),
            status_changed_at: Some(now),
            held_transitions: serde_json::json!([]),
            version: 7,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn row_converts_to_account() {
        let account = Account::try_from(row()).unwrap();

        assert_eq!(account.status, SubscriptionStatus::PastDue);
        assert_eq!(account.plan, PlanTier::Team);
        assert_eq!(account.seat_count, 3);
        assert_eq!(account.version, 7);
        assert_eq!(account.last_payment_status, Some(PaymentStatus::Overdue));
    }

    #[test]
    fn unknown_status_is_a_database_error() {
        let mut bad = row();
        bad.status = "paused".to_string();

        let err = Account::try_from(bad).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn held_transitions_round_through_jsonb() {
        let mut with_held = row();
        with_held.held_transitions = serde_json::json!([
            {"target": "past_due", "occurred_at": "2024-06-01T12:00:00Z"}
        ]);

        let account = Account::try_from(with_held).unwrap();

        assert_eq!(account.held_transitions.len(), 1);
        assert_eq!(account.held_transitions[0].target, SubscriptionStatus::PastDue);
        assert_eq!(
            held_transitions_param(&account).unwrap()[0]["target"],
            serde_json::json!("past_due")
        );
    }

    #[test]
    fn malformed_held_transitions_are_a_database_error() {
        let mut bad = row();
        bad.held_transitions = serde_json::json!({"target": "nope"});

        let err = Account::try_from(bad).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn negative_seat_count_is_rejected() {
        let mut bad = row();
        bad.seat_count = -1;

        assert!(Account::try_from(bad).is_err());
    }
}
