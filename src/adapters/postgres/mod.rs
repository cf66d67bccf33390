//! PostgreSQL adapters - database implementations of the store ports.
//!
//! - `PostgresAccountStore` - billing accounts with version-checked updates
//! - `PostgresSeatStore` - pending seat reservations and promoted seats
//!
//! Schema lives in `migrations/` and is applied with `sqlx::migrate!`.

mod account_store;
mod seat_store;

pub use account_store::PostgresAccountStore;
pub use seat_store::PostgresSeatStore;

use sqlx::PgPool;

/// Applies pending schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
