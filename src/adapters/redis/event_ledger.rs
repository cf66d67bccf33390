//! Redis-backed processed event ledger.
//!
//! One key per event id with a TTL. `SET NX EX` makes the first writer win;
//! the ledger only short-circuits duplicates, correctness still rests on
//! the version-checked account update.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::ProcessedEventLedger;

const KEY_PREFIX: &str = "billing:webhook:event:";

#[derive(Clone)]
pub struct RedisEventLedger {
    conn: MultiplexedConnection,
    ttl_secs: u64,
}

impl RedisEventLedger {
    pub fn new(conn: MultiplexedConnection, ttl_secs: u64) -> Self {
        Self { conn, ttl_secs }
    }

    fn key(event_id: &str) -> String {
        format!("{}{}", KEY_PREFIX, event_id)
    }
}

fn cache_error(e: redis::RedisError) -> DomainError {
    DomainError::new(ErrorCode::CacheError, format!("Event ledger unavailable: {}", e))
}

#[async_trait]
impl ProcessedEventLedger for RedisEventLedger {
    async fn contains(&self, event_id: &str) -> Result<bool, DomainError> {
        let mut conn = self.conn.clone();
        conn.exists(Self::key(event_id)).await.map_err(cache_error)
    }

    async fn mark_processed(&self, event_id: &str) -> Result<(), DomainError> {
        let mut conn = self.conn.clone();
        let _: Option<String> = redis::cmd("SET")
            .arg(Self::key(event_id))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(cache_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(
            RedisEventLedger::key("evt_42"),
            "billing:webhook:event:evt_42"
        );
    }
}
