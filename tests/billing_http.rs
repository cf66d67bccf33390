//! HTTP tests for the billing router, driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use secrecy::SecretString;
use serde_json::{json, Value};
use tower::ServiceExt;

use billing_reconciler::adapters::gateway::{
    signature_header, MockGatewayClient, WebhookAuthenticator,
};
use billing_reconciler::adapters::http::billing::{ACCESS_TOKEN_HEADER, SIGNATURE_HEADER};
use billing_reconciler::adapters::http::{app_router, BillingAppState};
use billing_reconciler::adapters::memory::{InMemoryAccountStore, InMemorySeatStore};
use billing_reconciler::application::AccountLocks;
use billing_reconciler::application::handlers::billing::PollConfig;
use billing_reconciler::config::ServerConfig;
use billing_reconciler::domain::billing::{Account, Pricing, SubscriptionStatus};
use billing_reconciler::domain::foundation::{AccountId, Email, Timestamp};
use billing_reconciler::ports::AccountStore;

const TOKEN: &str = "whtoken";

// =============================================================================
// Test Infrastructure
// =============================================================================

struct TestApp {
    router: Router,
    accounts: Arc<InMemoryAccountStore>,
}

impl TestApp {
    fn new(signing_secret: Option<&str>) -> Self {
        let accounts = Arc::new(InMemoryAccountStore::new());
        let state = BillingAppState {
            accounts: accounts.clone(),
            seats: Arc::new(InMemorySeatStore::new()),
            gateway: Arc::new(MockGatewayClient::new()),
            locks: AccountLocks::new(),
            pricing: Pricing {
                base_price_cents: 4_990,
                per_seat_price_cents: 1_990,
            },
            pending_seat_ttl_minutes: 30,
            poll_config: PollConfig {
                interval: Duration::from_millis(50),
                deadline: Duration::from_secs(1),
            },
            webhook_auth: WebhookAuthenticator::new(
                SecretString::new(TOKEN.to_string()),
                signing_secret.map(|s| SecretString::new(s.to_string())),
            ),
            notifier: None,
            ledger: None,
            identity: None,
        };
        Self {
            router: app_router(state, &ServerConfig::default()),
            accounts,
        }
    }

    async fn account(&self) -> Account {
        let account = Account::register(AccountId::new(), Email::parse("owner@acme.example").unwrap());
        self.accounts.insert(&account).await.unwrap();
        account
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}

fn webhook(body: &Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/gateway")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header(ACCESS_TOKEN_HEADER, token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn activation(account_id: AccountId) -> Value {
    json!({
        "eventKind": "SUBSCRIPTION_ACTIVATED",
        "payload": {
            "id": "sub_http",
            "customerRef": "cus_http",
            "status": "ACTIVE",
            "externalReference": account_id.to_string()
        }
    })
}

// =============================================================================
// Webhook
// =============================================================================

#[tokio::test]
async fn webhook_without_token_is_unauthorized_and_not_processed() {
    let app = TestApp::new(None);
    let account = app.account().await;

    let (status, body) = app.send(webhook(&activation(account.id), None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
    let stored = app.accounts.find_by_id(&account.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Trial);
}

#[tokio::test]
async fn webhook_with_wrong_token_is_unauthorized() {
    let app = TestApp::new(None);
    let account = app.account().await;

    let (status, _) = app.send(webhook(&activation(account.id), Some("guess"))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_webhook_is_bad_request() {
    let app = TestApp::new(None);

    let (status, body) = app
        .send(webhook(&json!({"eventKind": "PAYMENT_RECEIVED"}), Some(TOKEN)))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn valid_webhook_is_acknowledged_with_outcome() {
    let app = TestApp::new(None);
    let account = app.account().await;

    let (status, body) = app.send(webhook(&activation(account.id), Some(TOKEN))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "applied");
    assert_eq!(body["to"], "active");
}

#[tokio::test]
async fn webhook_for_unknown_account_is_still_acknowledged() {
    let app = TestApp::new(None);

    let (status, body) = app
        .send(webhook(&activation(AccountId::new()), Some(TOKEN)))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "deferred");
}

#[tokio::test]
async fn signed_webhook_requires_valid_signature() {
    let secret = "whsec_http";
    let app = TestApp::new(Some(secret));
    let account = app.account().await;
    let body = activation(account.id);

    let (status, _) = app.send(webhook(&body, Some(TOKEN))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let raw = body.to_string();
    let header = signature_header(
        &SecretString::new(secret.to_string()),
        Timestamp::now().as_unix_secs(),
        raw.as_bytes(),
    );
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/gateway")
        .header(ACCESS_TOKEN_HEADER, TOKEN)
        .header(SIGNATURE_HEADER, header)
        .body(Body::from(raw))
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "applied");
}

// =============================================================================
// Billing routes
// =============================================================================

#[tokio::test]
async fn billing_breakdown_for_new_account() {
    let app = TestApp::new(None);
    let account = app.account().await;

    let (status, body) = app
        .send(
            Request::builder()
                .uri(format!("/billing/accounts/{}/billing", account.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seat_count"], 0);
    assert_eq!(body["total_cents"], 4_990);
}

#[tokio::test]
async fn unknown_account_is_not_found() {
    let app = TestApp::new(None);

    let (status, body) = app
        .send(
            Request::builder()
                .uri(format!("/billing/accounts/{}/billing", AccountId::new()))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn malformed_account_id_is_bad_request() {
    let app = TestApp::new(None);

    let (status, body) = app
        .send(
            Request::builder()
                .uri("/billing/accounts/not-a-uuid/billing")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn checkout_creates_gateway_billing() {
    let app = TestApp::new(None);
    let account = app.account().await;

    let (status, body) = app
        .send(
            Request::builder()
                .method("POST")
                .uri(format!("/billing/accounts/{}/checkout", account.id))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "name": "Acme Ltda",
                        "document": "12.345.678/0001-90",
                        "email": "owner@acme.example",
                        "address": {
                            "postal_code": "01310-100",
                            "street": "Av. Paulista",
                            "number": "1000",
                            "complement": null,
                            "city": "Sao Paulo"
                        },
                        "billing_method": "CREDIT_CARD"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(body["checkout_url"].as_str().unwrap().starts_with("https://"));
    let stored = app.accounts.find_by_id(&account.id).await.unwrap().unwrap();
    assert_eq!(stored.external_customer_id.as_deref(), body["customer_id"].as_str());
}

#[tokio::test]
async fn seat_without_primary_plan_is_rejected() {
    let app = TestApp::new(None);
    let account = app.account().await;

    let (status, body) = app
        .send(
            Request::builder()
                .method("POST")
                .uri(format!("/billing/accounts/{}/seats", account.id))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "candidate_id": "cand-1",
                        "email": "ana@acme.example",
                        "name": "Ana",
                        "billing_method": "INSTANT_TRANSFER"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn unknown_payment_status_is_not_found() {
    let app = TestApp::new(None);

    let (status, _) = app
        .send(
            Request::builder()
                .uri("/billing/status/payments/pay_missing")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn waiting_on_an_unknown_payment_expires() {
    let app = TestApp::new(None);

    let (status, body) = app
        .send(
            Request::builder()
                .uri("/billing/status/payments/pay_missing/wait")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "expired");
}
