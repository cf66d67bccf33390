//! Axum router configuration for billing endpoints.

use std::time::Duration;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;

use super::handlers::{
    add_seat, cancel_pending_seat, compute_billing, create_checkout, handle_gateway_webhook,
    payment_status, reactivate_seat, remove_seat, subscription_status, suspend_seat,
    wait_for_payment, wait_for_pending_seat, BillingAppState,
};

/// Account-scoped billing routes.
///
/// # Routes
/// - `POST /accounts/:account_id/checkout` - Provision gateway billing
/// - `GET /accounts/:account_id/billing` - Current billing breakdown
/// - `POST /accounts/:account_id/seats` - Buy a seat
/// - `DELETE /accounts/:account_id/seats/:candidate_id` - Remove a seat
/// - `POST /accounts/:account_id/seats/:candidate_id/suspend`
/// - `POST /accounts/:account_id/seats/:candidate_id/reactivate`
/// - `DELETE /accounts/:account_id/pending-seats/:payment_ref` - Abandon an unpaid seat
/// - `POST /accounts/:account_id/pending-seats/:payment_ref/wait` - Wait for a seat payment
///
/// ## Status
/// - `GET /status/subscriptions/:reference`
/// - `GET /status/payments/:reference`
/// - `GET /status/payments/:reference/wait`
///
/// The wait routes hold the request open until their own deadline, so
/// `request_timeout` applies to every route except them.
pub fn billing_routes(request_timeout: Duration) -> Router<BillingAppState> {
    Router::new()
        .route("/accounts/:account_id/checkout", post(create_checkout))
        .route("/accounts/:account_id/billing", get(compute_billing))
        .route("/accounts/:account_id/seats", post(add_seat))
        .route("/accounts/:account_id/seats/:candidate_id", delete(remove_seat))
        .route(
            "/accounts/:account_id/seats/:candidate_id/suspend",
            post(suspend_seat),
        )
        .route(
            "/accounts/:account_id/seats/:candidate_id/reactivate",
            post(reactivate_seat),
        )
        .route(
            "/accounts/:account_id/pending-seats/:payment_ref",
            delete(cancel_pending_seat),
        )
        .route("/status/subscriptions/:reference", get(subscription_status))
        .route("/status/payments/:reference", get(payment_status))
        .route_layer(TimeoutLayer::new(request_timeout))
        .route(
            "/accounts/:account_id/pending-seats/:payment_ref/wait",
            post(wait_for_pending_seat),
        )
        .route("/status/payments/:reference/wait", get(wait_for_payment))
}

/// Gateway webhook routes.
///
/// Separate from the billing routes because deliveries are authenticated by
/// the gateway token, not by an operator session.
///
/// # Routes
/// - `POST /gateway` - Reconcile a gateway notification
pub fn webhook_routes(request_timeout: Duration) -> Router<BillingAppState> {
    Router::new()
        .route("/gateway", post(handle_gateway_webhook))
        .route_layer(TimeoutLayer::new(request_timeout))
}

/// The complete billing router, mounted at the server root.
pub fn billing_router(request_timeout: Duration) -> Router<BillingAppState> {
    Router::new()
        .nest("/billing", billing_routes(request_timeout))
        .nest("/webhooks", webhook_routes(request_timeout))
}
