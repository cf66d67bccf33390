//! Pricing configuration

use serde::Deserialize;

use crate::domain::billing::Pricing;

use super::error::ValidationError;

/// Plan prices in integer cents
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_base_price")]
    pub base_price_cents: i64,

    #[serde(default = "default_per_seat_price")]
    pub per_seat_price_cents: i64,
}

impl PricingConfig {
    pub fn pricing(&self) -> Pricing {
        Pricing {
            base_price_cents: self.base_price_cents,
            per_seat_price_cents: self.per_seat_price_cents,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.base_price_cents <= 0 || self.per_seat_price_cents < 0 {
            return Err(ValidationError::InvalidPrice);
        }
        Ok(())
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_price_cents: default_base_price(),
            per_seat_price_cents: default_per_seat_price(),
        }
    }
}

fn default_base_price() -> i64 {
    4_990
}

fn default_per_seat_price() -> i64 {
    1_990
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PricingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_free_base_plan_rejected() {
        let config = PricingConfig {
            base_price_cents: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidPrice));
    }

    #[test]
    fn test_free_seats_allowed() {
        let config = PricingConfig {
            per_seat_price_cents: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.pricing().per_seat_price_cents, 0);
    }
}
