//! Billing breakdown: base price plus per-seat charges.

use serde::{Deserialize, Serialize};

/// Prices in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub base_price_cents: i64,
    pub per_seat_price_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingBreakdown {
    pub base_price_cents: i64,
    pub per_seat_price_cents: i64,
    pub seat_count: u32,
    pub total_cents: i64,
}

impl BillingBreakdown {
    /// Computes the breakdown from a freshly counted seat total.
    pub fn compute(pricing: Pricing, active_seats: u32) -> Self {
        Self {
            base_price_cents: pricing.base_price_cents,
            per_seat_price_cents: pricing.per_seat_price_cents,
            seat_count: active_seats,
            total_cents: pricing.base_price_cents
                + i64::from(active_seats) * pricing.per_seat_price_cents,
        }
    }
}
