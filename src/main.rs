//! Billing Reconciler server.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use billing_reconciler::adapters::email::{ResendConfig, ResendNotifier};
use billing_reconciler::adapters::gateway::{
    HttpGatewayClient, HttpGatewayConfig, WebhookAuthenticator,
};
use billing_reconciler::adapters::http::{app_router, BillingAppState};
use billing_reconciler::adapters::identity::{ZitadelConfig, ZitadelIdentityProvider};
use billing_reconciler::adapters::postgres::{
    run_migrations, PostgresAccountStore, PostgresSeatStore,
};
use billing_reconciler::adapters::redis::RedisEventLedger;
use billing_reconciler::application::AccountLocks;
use billing_reconciler::config::{AppConfig, LogFormat, RedisConfig};
use billing_reconciler::ports::{IdentityProvider, PaymentNotifier, ProcessedEventLedger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        "Starting billing reconciler"
    );

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;
    tracing::info!(url = %config.database.redacted_url(), "Database connection established");
    if config.database.run_migrations {
        run_migrations(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    let gateway = HttpGatewayClient::new(
        HttpGatewayConfig::new(
            config.gateway.api_base_url.clone(),
            config.gateway.api_key.clone(),
        )
        .with_timeout(config.gateway.request_timeout()),
    )?;

    let ledger = match &config.redis {
        Some(redis) => match connect_ledger(redis).await {
            Ok(ledger) => Some(ledger),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, running without webhook event ledger");
                None
            }
        },
        None => {
            tracing::info!("Redis not configured, webhook event ledger disabled");
            None
        }
    };

    let notifier = match &config.email {
        Some(email) => {
            let notifier = ResendNotifier::new(
                ResendConfig::new(email.resend_api_key.clone(), email.from_header())
                    .with_reply_to(email.reply_to.clone()),
            )?;
            Some(Arc::new(notifier) as Arc<dyn PaymentNotifier>)
        }
        None => None,
    };

    let identity = match &config.identity {
        Some(identity) => {
            let provider = ZitadelIdentityProvider::new(ZitadelConfig::new(
                identity.issuer_url.clone(),
                identity.service_token.clone(),
            ))?;
            Some(Arc::new(provider) as Arc<dyn IdentityProvider>)
        }
        None => None,
    };

    let state = BillingAppState {
        accounts: Arc::new(PostgresAccountStore::new(pool.clone())),
        seats: Arc::new(PostgresSeatStore::new(pool.clone())),
        gateway: Arc::new(gateway),
        locks: AccountLocks::new(),
        pricing: config.pricing.pricing(),
        pending_seat_ttl_minutes: config.seats.pending_ttl_minutes,
        poll_config: config.polling.poll_config(),
        webhook_auth: WebhookAuthenticator::new(
            config.gateway.webhook_access_token.clone(),
            config.gateway.webhook_signing_secret.clone(),
        ),
        notifier,
        ledger,
        identity,
    };

    let app = app_router(state, &config.server);
    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    let shutdown = CancellationToken::new();
    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        let _drop = ctrl_c_token.drop_guard();
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received ctrl-c, shutting down"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for ctrl-c"),
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    pool.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// `RUST_LOG` overrides the configured filter.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.server.log_format() {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
    }
}

async fn connect_ledger(config: &RedisConfig) -> anyhow::Result<Arc<dyn ProcessedEventLedger>> {
    let client = redis::Client::open(config.url.as_str())?;
    let conn = tokio::time::timeout(
        config.connect_timeout(),
        client.get_multiplexed_tokio_connection(),
    )
    .await
    .map_err(|_| anyhow::anyhow!("timed out connecting to {}", config.redacted_url()))??;
    tracing::info!(ttl_secs = config.ledger_ttl_secs, "Webhook event ledger connected");
    Ok(Arc::new(RedisEventLedger::new(conn, config.ledger_ttl_secs)))
}
