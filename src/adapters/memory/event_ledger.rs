//! In-memory processed event ledger.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::DomainError;
use crate::ports::ProcessedEventLedger;

#[derive(Default, Clone)]
pub struct InMemoryEventLedger {
    processed: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryEventLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessedEventLedger for InMemoryEventLedger {
    async fn contains(&self, event_id: &str) -> Result<bool, DomainError> {
        Ok(self.processed.read().await.contains(event_id))
    }

    async fn mark_processed(&self, event_id: &str) -> Result<(), DomainError> {
        self.processed.write().await.insert(event_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn contains_returns_false_for_new_event() {
        let ledger = InMemoryEventLedger::new();
        assert!(!ledger.contains("evt_1").await.unwrap());
    }

    #[tokio::test]
    async fn contains_returns_true_after_mark_processed() {
        let ledger = InMemoryEventLedger::new();
        ledger.mark_processed("evt_1").await.unwrap();
        assert!(ledger.contains("evt_1").await.unwrap());
        assert!(!ledger.contains("evt_2").await.unwrap());
    }
}
