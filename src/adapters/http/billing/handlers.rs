//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to the billing command/query handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Json, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::adapters::gateway::{WebhookAuthError, WebhookAuthenticator};
use crate::application::account_writer::{AccountLocks, AccountWriter};
use crate::application::handlers::billing::{
    AddSeatCommand, AddSeatHandler, CancelPendingSeatCommand, CancelPendingSeatHandler,
    ComputeBillingHandler, ComputeBillingQuery, CreateCheckoutCommand, CreateCheckoutHandler,
    PollConfig, PollPaymentCommand, PollPaymentHandler, ReactivateSeatCommand,
    ReactivateSeatHandler, ReconcileWebhookCommand, ReconcileWebhookHandler, RemoveSeatCommand,
    RemoveSeatHandler, ResolveStatusHandler, SeatCounter, StatusQuery, SuspendSeatCommand,
    SuspendSeatHandler,
};
use crate::domain::billing::{BillingError, Pricing};
use crate::domain::foundation::{
    AccountId, CandidateId, DomainError, ErrorCode, Timestamp, ValidationError,
};
use crate::ports::{
    AccountStore, GatewayClient, IdentityProvider, PaymentNotifier, ProcessedEventLedger,
    SeatStore,
};

use super::dto::{AddSeatRequest, CheckoutResponse, CreateCheckoutRequest, ErrorResponse, WaitParams};

/// Header carrying the gateway's shared webhook token.
pub const ACCESS_TOKEN_HEADER: &str = "gateway-access-token";

/// Header carrying `t=<unix>,v1=<hex>` when deliveries are signed.
pub const SIGNATURE_HEADER: &str = "gateway-signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the billing routes.
///
/// Cloned per request. The account locks are shared by every handler built
/// from it, so all writers of one account serialize on the same mutex.
#[derive(Clone)]
pub struct BillingAppState {
    pub accounts: Arc<dyn AccountStore>,
    pub seats: Arc<dyn SeatStore>,
    pub gateway: Arc<dyn GatewayClient>,
    pub locks: AccountLocks,
    pub pricing: Pricing,
    pub pending_seat_ttl_minutes: i64,
    pub poll_config: PollConfig,
    pub webhook_auth: WebhookAuthenticator,
    pub notifier: Option<Arc<dyn PaymentNotifier>>,
    pub ledger: Option<Arc<dyn ProcessedEventLedger>>,
    pub identity: Option<Arc<dyn IdentityProvider>>,
}

impl BillingAppState {
    fn writer(&self) -> AccountWriter {
        AccountWriter::new(self.accounts.clone(), self.locks.clone())
    }

    fn seat_counter(&self) -> SeatCounter {
        SeatCounter::new(self.seats.clone(), self.writer())
    }

    pub fn checkout_handler(&self) -> CreateCheckoutHandler {
        let handler = CreateCheckoutHandler::new(self.writer(), self.gateway.clone(), self.pricing);
        match &self.identity {
            Some(identity) => handler.with_identity_provider(identity.clone()),
            None => handler,
        }
    }

    pub fn webhook_handler(&self) -> ReconcileWebhookHandler {
        let mut handler =
            ReconcileWebhookHandler::new(self.writer(), self.seats.clone(), self.seat_counter());
        if let Some(notifier) = &self.notifier {
            handler = handler.with_notifier(notifier.clone());
        }
        if let Some(ledger) = &self.ledger {
            handler = handler.with_ledger(ledger.clone());
        }
        handler
    }

    pub fn status_handler(&self) -> ResolveStatusHandler {
        ResolveStatusHandler::local_then_gateway(
            self.accounts.clone(),
            self.seats.clone(),
            self.gateway.clone(),
        )
    }

    pub fn compute_billing_handler(&self) -> ComputeBillingHandler {
        ComputeBillingHandler::new(self.accounts.clone(), self.seat_counter(), self.pricing)
    }

    pub fn add_seat_handler(&self) -> AddSeatHandler {
        AddSeatHandler::new(
            self.writer(),
            self.seats.clone(),
            self.gateway.clone(),
            self.pricing,
            self.pending_seat_ttl_minutes,
        )
    }

    pub fn remove_seat_handler(&self) -> RemoveSeatHandler {
        RemoveSeatHandler::new(
            self.writer(),
            self.seats.clone(),
            self.gateway.clone(),
            self.seat_counter(),
        )
    }

    pub fn suspend_seat_handler(&self) -> SuspendSeatHandler {
        SuspendSeatHandler::new(
            self.writer(),
            self.seats.clone(),
            self.gateway.clone(),
            self.seat_counter(),
        )
    }

    pub fn reactivate_seat_handler(&self) -> ReactivateSeatHandler {
        ReactivateSeatHandler::new(
            self.writer(),
            self.seats.clone(),
            self.seat_counter(),
            self.add_seat_handler(),
        )
    }

    pub fn cancel_pending_seat_handler(&self) -> CancelPendingSeatHandler {
        CancelPendingSeatHandler::new(self.locks.clone(), self.seats.clone(), self.gateway.clone())
    }

    pub fn poll_handler(&self) -> PollPaymentHandler {
        PollPaymentHandler::new(
            Arc::new(self.status_handler()),
            Arc::new(self.cancel_pending_seat_handler()),
            self.poll_config,
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/gateway - Reconcile a gateway notification
///
/// 401 when the delivery cannot be authenticated, 400 when the body is not a
/// webhook envelope, 200 with the reconciliation outcome otherwise.
pub async fn handle_gateway_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, BillingApiError> {
    let received_at = Timestamp::now();
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    state
        .webhook_auth
        .verify(
            header(ACCESS_TOKEN_HEADER),
            header(SIGNATURE_HEADER),
            &body,
            received_at.as_unix_secs(),
        )
        .map_err(BillingApiError::Unauthenticated)?;

    let result = state
        .webhook_handler()
        .handle(ReconcileWebhookCommand {
            body: body.to_vec(),
            received_at,
        })
        .await?;

    Ok((StatusCode::OK, Json(result)).into_response())
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /billing/accounts/:account_id/checkout - Provision gateway billing
pub async fn create_checkout(
    State(state): State<BillingAppState>,
    Path(account_id): Path<String>,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CreateCheckoutCommand {
        account_id: parse_account_id(&account_id)?,
        profile: request.profile()?,
        billing_method: request.billing_method,
        identity_id: request.identity()?,
    };

    let result = state.checkout_handler().handle(cmd).await?;

    Ok((StatusCode::CREATED, Json(CheckoutResponse::from(result))))
}

/// POST /billing/accounts/:account_id/seats - Buy a seat
pub async fn add_seat(
    State(state): State<BillingAppState>,
    Path(account_id): Path<String>,
    Json(request): Json<AddSeatRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = AddSeatCommand {
        account_id: parse_account_id(&account_id)?,
        candidate: request.candidate()?,
        billing_method: request.billing_method,
    };

    let result = state.add_seat_handler().handle(cmd).await?;

    let status = if result.coalesced {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(result)))
}

/// DELETE /billing/accounts/:account_id/seats/:candidate_id - Remove a seat
pub async fn remove_seat(
    State(state): State<BillingAppState>,
    Path((account_id, candidate_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = RemoveSeatCommand {
        account_id: parse_account_id(&account_id)?,
        candidate_id: CandidateId::new(candidate_id)?,
    };

    let result = state.remove_seat_handler().handle(cmd).await?;
    Ok(Json(result))
}

/// POST /billing/accounts/:account_id/seats/:candidate_id/suspend
pub async fn suspend_seat(
    State(state): State<BillingAppState>,
    Path((account_id, candidate_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = SuspendSeatCommand {
        account_id: parse_account_id(&account_id)?,
        candidate_id: CandidateId::new(candidate_id)?,
    };

    let result = state.suspend_seat_handler().handle(cmd).await?;
    Ok(Json(result))
}

/// POST /billing/accounts/:account_id/seats/:candidate_id/reactivate
pub async fn reactivate_seat(
    State(state): State<BillingAppState>,
    Path((account_id, candidate_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = ReactivateSeatCommand {
        account_id: parse_account_id(&account_id)?,
        candidate_id: CandidateId::new(candidate_id)?,
    };

    let result = state.reactivate_seat_handler().handle(cmd).await?;
    Ok(Json(result))
}

/// DELETE /billing/accounts/:account_id/pending-seats/:payment_ref
pub async fn cancel_pending_seat(
    State(state): State<BillingAppState>,
    Path((account_id, payment_ref)): Path<(String, String)>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CancelPendingSeatCommand {
        account_id: parse_account_id(&account_id)?,
        payment_ref,
    };

    let result = state.cancel_pending_seat_handler().handle(cmd).await?;
    Ok(Json(result))
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// GET /billing/status/subscriptions/:reference
pub async fn subscription_status(
    State(state): State<BillingAppState>,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, BillingApiError> {
    let view = state
        .status_handler()
        .handle(StatusQuery::Subscription(reference))
        .await?;
    Ok(Json(view))
}

/// GET /billing/status/payments/:reference
pub async fn payment_status(
    State(state): State<BillingAppState>,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, BillingApiError> {
    let view = state
        .status_handler()
        .handle(StatusQuery::Payment(reference))
        .await?;
    Ok(Json(view))
}

/// GET /billing/accounts/:account_id/billing - Current billing breakdown
pub async fn compute_billing(
    State(state): State<BillingAppState>,
    Path(account_id): Path<String>,
) -> Result<impl IntoResponse, BillingApiError> {
    let query = ComputeBillingQuery {
        account_id: parse_account_id(&account_id)?,
    };

    let breakdown = state.compute_billing_handler().handle(query).await?;
    Ok(Json(breakdown))
}

/// GET /billing/status/payments/:reference/wait - Hold the request until the
/// payment is paid or the deadline passes
pub async fn wait_for_payment(
    State(state): State<BillingAppState>,
    Path(reference): Path<String>,
    Query(params): Query<WaitParams>,
) -> impl IntoResponse {
    let session = state.poll_handler().start(PollPaymentCommand {
        query: StatusQuery::Payment(reference),
        pending_seat: None,
        deadline: params.deadline_secs.map(Duration::from_secs),
    });
    Json(session.finished().await)
}

/// POST /billing/accounts/:account_id/pending-seats/:payment_ref/wait
///
/// Like [`wait_for_payment`], but a client that disconnects before the
/// payment lands gives the pending seat up.
pub async fn wait_for_pending_seat(
    State(state): State<BillingAppState>,
    Path((account_id, payment_ref)): Path<(String, String)>,
    Query(params): Query<WaitParams>,
) -> Result<impl IntoResponse, BillingApiError> {
    let account_id = parse_account_id(&account_id)?;
    let session = state.poll_handler().start(PollPaymentCommand {
        query: StatusQuery::Payment(payment_ref.clone()),
        pending_seat: Some(CancelPendingSeatCommand {
            account_id,
            payment_ref,
        }),
        deadline: params.deadline_secs.map(Duration::from_secs),
    });
    Ok(Json(session.finished().await))
}

fn parse_account_id(raw: &str) -> Result<AccountId, BillingApiError> {
    raw.parse()
        .map_err(|_| BillingApiError::from(BillingError::validation("account_id", "expected a UUID")))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
#[derive(Debug)]
pub enum BillingApiError {
    Billing(BillingError),
    Unauthenticated(WebhookAuthError),
}

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self::Billing(err)
    }
}

impl From<DomainError> for BillingApiError {
    fn from(err: DomainError) -> Self {
        Self::Billing(err.into())
    }
}

impl From<ValidationError> for BillingApiError {
    fn from(err: ValidationError) -> Self {
        Self::Billing(err.into())
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let err = match self {
            BillingApiError::Unauthenticated(e) => {
                let body = ErrorResponse::new(ErrorCode::Unauthorized.to_string(), e.to_string());
                return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
            }
            BillingApiError::Billing(err) => err,
        };

        let status = match &err {
            BillingError::Validation { .. } => StatusCode::BAD_REQUEST,
            BillingError::NotFound { .. } => StatusCode::NOT_FOUND,
            BillingError::AlreadyLinked { .. } | BillingError::NotLinked { .. } => {
                StatusCode::CONFLICT
            }
            BillingError::GatewayUnavailable { .. } | BillingError::CheckoutFailed { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            BillingError::RegistrationRolledBack { .. } => StatusCode::GONE,
            BillingError::Inconsistent(_) | BillingError::Infrastructure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match &err {
            BillingError::Infrastructure(detail) => {
                tracing::error!(error = %detail, "Billing request failed");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorResponse::new(err.code().to_string(), message).retryable(err.is_retryable());
        (status, Json(body)).into_response()
    }
}
