//! Payment polling configuration

use serde::Deserialize;
use std::time::Duration;

use crate::application::handlers::billing::PollConfig;

use super::error::ValidationError;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PollingConfig {
    /// Delay between status checks, in milliseconds
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// How long a client may wait for a payment, in seconds
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,
}

impl PollingConfig {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.interval_ms),
            deadline: Duration::from_secs(self.deadline_secs),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.interval_ms == 0 || self.interval_ms >= self.deadline_secs.saturating_mul(1_000) {
            return Err(ValidationError::InvalidPollingWindow);
        }
        Ok(())
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            deadline_secs: default_deadline(),
        }
    }
}

fn default_interval() -> u64 {
    3_000
}

fn default_deadline() -> u64 {
    600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PollingConfig::default().poll_config();
        assert_eq!(config.interval, Duration::from_secs(3));
        assert_eq!(config.deadline, Duration::from_secs(600));
    }

    #[test]
    fn test_interval_longer_than_deadline_rejected() {
        let config = PollingConfig {
            interval_ms: 5_000,
            deadline_secs: 2,
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidPollingWindow));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = PollingConfig {
            interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
