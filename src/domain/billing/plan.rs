//! Plan tier tag stored on the account.

use crate::domain::foundation::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription plan tier.
///
/// Derived from the seat count: an account with any billed seat is a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Individual,
    Team,
}

impl PlanTier {
    /// Tier implied by the number of active seats.
    pub fn for_seat_count(seat_count: u32) -> Self {
        if seat_count == 0 {
            PlanTier::Individual
        } else {
            PlanTier::Team
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Individual => "individual",
            PlanTier::Team => "team",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "individual" => Ok(PlanTier::Individual),
            "team" => Ok(PlanTier::Team),
            other => Err(ValidationError::invalid_format(
                "subscription_plan",
                format!("unknown plan '{}'", other),
            )),
        }
    }
}
