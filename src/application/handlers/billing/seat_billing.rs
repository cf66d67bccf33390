//! Lookups and gateway calls shared by the seat handlers.

use crate::domain::billing::{
    Account, BillingError, BillingMethod, Pricing, Seat, SeatCandidate,
};
use crate::domain::foundation::{AccountId, CandidateId, Timestamp};
use crate::ports::{
    BillingCycle, CreateSubscriptionRequest, GatewayClient, GatewayError, GatewayErrorCode,
    GatewaySubscription, SeatStore,
};

/// The candidate's seat, which must be linked to `account_id`.
pub(super) async fn find_account_seat(
    seats: &dyn SeatStore,
    account_id: AccountId,
    candidate_id: &CandidateId,
) -> Result<Seat, BillingError> {
    let seat = seats
        .find_seat_by_candidate(candidate_id)
        .await?
        .ok_or_else(|| BillingError::not_found("Seat", candidate_id))?;
    if !seat.is_linked() || seat.account_id != Some(account_id) {
        return Err(BillingError::not_linked(candidate_id));
    }
    Ok(seat)
}

/// Gateway customer a new seat charge goes to.
///
/// Seats are only sold on a primary plan that is paid and current.
pub(super) fn seat_customer(account: &Account) -> Result<String, BillingError> {
    account
        .seat_billing_customer()
        .map(str::to_string)
        .ok_or_else(|| {
            BillingError::validation(
                "account",
                format!(
                    "seats can only be billed on an active primary plan (account is {})",
                    account.status
                ),
            )
        })
}

/// Creates a seat's own recurring charge on the account's customer.
pub(super) async fn create_seat_subscription(
    gateway: &dyn GatewayClient,
    pricing: Pricing,
    customer_id: &str,
    candidate: &SeatCandidate,
    billing_method: BillingMethod,
    external_reference: String,
) -> Result<GatewaySubscription, GatewayError> {
    gateway
        .create_subscription(CreateSubscriptionRequest {
            customer_id: customer_id.to_string(),
            value_cents: pricing.per_seat_price_cents,
            cycle: BillingCycle::Monthly,
            next_due_date: Timestamp::now().date(),
            billing_method,
            description: format!("Seat: {}", candidate.name),
            external_reference,
        })
        .await
}

/// Cancels a subscription, treating "already gone" as done.
pub(super) async fn cancel_subscription(
    gateway: &dyn GatewayClient,
    subscription_id: &str,
) -> Result<(), GatewayError> {
    match gateway.cancel_subscription(subscription_id).await {
        Err(e) if e.code == GatewayErrorCode::NotFound => Ok(()),
        other => other,
    }
}

/// Cancels a subscription and only logs a failure.
pub(super) async fn cancel_best_effort(gateway: &dyn GatewayClient, subscription_id: &str) {
    if let Err(e) = cancel_subscription(gateway, subscription_id).await {
        tracing::warn!(
            subscription_id = %subscription_id,
            error = %e,
            "Best-effort gateway cancellation failed"
        );
    }
}
