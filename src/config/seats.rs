//! Seat purchase configuration

use serde::Deserialize;

use super::error::ValidationError;

const MAX_PENDING_TTL_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SeatsConfig {
    /// Minutes an unpaid seat request blocks a new one for the same e-mail
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl_minutes: i64,
}

impl SeatsConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=MAX_PENDING_TTL_MINUTES).contains(&self.pending_ttl_minutes) {
            return Err(ValidationError::InvalidPendingSeatTtl);
        }
        Ok(())
    }
}

impl Default for SeatsConfig {
    fn default() -> Self {
        Self {
            pending_ttl_minutes: default_pending_ttl(),
        }
    }
}

fn default_pending_ttl() -> i64 {
    30
}
