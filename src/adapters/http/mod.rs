//! HTTP adapters - REST API implementations.

pub mod billing;

pub use billing::{billing_router, BillingAppState};

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;

/// The served application: billing routes plus CORS and request tracing.
pub fn app_router(state: BillingAppState, server: &ServerConfig) -> Router {
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]);

    billing_router(server.request_timeout())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
