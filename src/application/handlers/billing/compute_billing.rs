//! ComputeBillingHandler - what the account pays per cycle.
//!
//! Always counts the seat list; the account's stored seat count is never
//! read here.

use std::sync::Arc;

use crate::domain::billing::{BillingBreakdown, BillingError, Pricing};
use crate::domain::foundation::AccountId;
use crate::ports::AccountStore;

use super::SeatCounter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeBillingQuery {
    pub account_id: AccountId,
}

pub struct ComputeBillingHandler {
    accounts: Arc<dyn AccountStore>,
    seat_counter: SeatCounter,
    pricing: Pricing,
}

impl ComputeBillingHandler {
    pub fn new(accounts: Arc<dyn AccountStore>, seat_counter: SeatCounter, pricing: Pricing) -> Self {
        Self {
            accounts,
            seat_counter,
            pricing,
        }
    }

    pub async fn handle(&self, query: ComputeBillingQuery) -> Result<BillingBreakdown, BillingError> {
        if self.accounts.find_by_id(&query.account_id).await?.is_none() {
            return Err(BillingError::not_found("Account", query.account_id));
        }
        let active_seats = self.seat_counter.count_billed(&query.account_id).await?;
        Ok(BillingBreakdown::compute(self.pricing, active_seats))
    }
}
