//! Seats - secondary paid user slots attached to an account.

use crate::domain::foundation::{
    AccountId, CandidateId, Email, SeatId, StateMachine, Timestamp, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Billing state of a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatBilling {
    /// Billed and counted.
    Active,
    /// Billing canceled, still linked to the account.
    Suspended,
    /// Unlinked from any account.
    Removed,
}

impl SeatBilling {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatBilling::Active => "active",
            SeatBilling::Suspended => "suspended",
            SeatBilling::Removed => "removed",
        }
    }
}

impl fmt::Display for SeatBilling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SeatBilling {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SeatBilling::Active),
            "suspended" => Ok(SeatBilling::Suspended),
            "removed" => Ok(SeatBilling::Removed),
            other => Err(ValidationError::invalid_format(
                "seat_billing",
                format!("unknown seat billing state '{}'", other),
            )),
        }
    }
}

impl StateMachine for SeatBilling {
    const FIELD: &'static str = "seat_billing";

    fn valid_transitions(&self) -> &'static [Self] {
        use SeatBilling::*;
        match self {
            Active => &[Suspended, Removed],
            Suspended => &[Active, Removed],
            // bought again
            Removed => &[Active],
        }
    }
}

/// The person a seat is being bought for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatCandidate {
    pub candidate_id: CandidateId,
    pub email: Email,
    pub name: String,
}

impl SeatCandidate {
    pub fn new(
        candidate_id: impl Into<String>,
        email: impl AsRef<str>,
        name: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::empty_field("name"));
        }
        Ok(Self {
            candidate_id: CandidateId::new(candidate_id)?,
            email: Email::parse(email)?,
            name,
        })
    }
}

/// A promoted seat.
///
/// One record per candidate: a candidate belongs to at most one account at
/// a time, and a removed seat is relinked rather than duplicated when the
/// candidate is bought again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    pub account_id: Option<AccountId>,
    pub candidate_id: CandidateId,
    pub email: Email,
    pub name: String,
    pub external_subscription_id: Option<String>,
    pub billing: SeatBilling,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Seat {
    pub fn promote(
        account_id: AccountId,
        candidate: SeatCandidate,
        external_subscription_id: Option<String>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: SeatId::new(),
            account_id: Some(account_id),
            candidate_id: candidate.candidate_id,
            email: candidate.email,
            name: candidate.name,
            external_subscription_id,
            billing: SeatBilling::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when this seat counts toward `account_id`'s seat total.
    pub fn is_billed_to(&self, account_id: &AccountId) -> bool {
        self.account_id.as_ref() == Some(account_id) && self.billing == SeatBilling::Active
    }

    /// True when the seat is tied to some account (active or paused).
    pub fn is_linked(&self) -> bool {
        self.account_id.is_some() && self.billing != SeatBilling::Removed
    }

    /// Relinks a removed seat to an account with new billing.
    pub fn relink(
        &mut self,
        account_id: AccountId,
        external_subscription_id: Option<String>,
    ) -> Result<(), ValidationError> {
        self.billing = self.billing.transition_to(SeatBilling::Active)?;
        self.account_id = Some(account_id);
        self.external_subscription_id = external_subscription_id;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Stops billing, keeps the account link.
    pub fn suspend(&mut self) -> Result<(), ValidationError> {
        self.billing = self.billing.transition_to(SeatBilling::Suspended)?;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Restarts billing on a still linked seat.
    pub fn reactivate(&mut self, external_subscription_id: String) -> Result<(), ValidationError> {
        self.billing = self.billing.transition_to(SeatBilling::Active)?;
        self.external_subscription_id = Some(external_subscription_id);
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Unlinks the seat from its account.
    pub fn remove(&mut self) -> Result<(), ValidationError> {
        self.billing = self.billing.transition_to(SeatBilling::Removed)?;
        self.account_id = None;
        self.updated_at = Timestamp::now();
        Ok(())
    }
}
