//! Mandate billing service entry point.
//!
//! Loads configuration, connects to PostgreSQL, starts the webhook
//! worker and serves the billing API until Ctrl+C or SIGTERM.

use std::error::Error;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use mandate_billing::adapters::http::billing::{
    billing_router, BillingAppState, BillingPorts, BillingSettings, RedirectTargets,
};
use mandate_billing::adapters::postgres::{
    PostgresGatewayConfigStore, PostgresMandateRepository, PostgresPriceCatalog,
    PostgresPurchaseRepository, PostgresSubscriptionStore,
};
use mandate_billing::adapters::{
    ChannelWebhookQueue, HttpPaymentGateway, LoggingNotifier, WebhookWorker, WebhookWorkerConfig,
};
use mandate_billing::application::handlers::billing::{CallbackUrls, RecurringBillingConfig};
use mandate_billing::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config);

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    let (queue, deliveries) = ChannelWebhookQueue::bounded(config.billing.webhook_queue_capacity);
    let state = BillingAppState::new(ports(&config, pool, queue)?, settings(&config)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = WebhookWorker::new(
        deliveries,
        state.process_webhook.clone(),
        WebhookWorkerConfig::default(),
    );
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    let app = billing_router()
        .with_state(state)
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(cors_layer(&config))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = ?config.server.environment, "Billing service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The server no longer accepts webhooks; drain what was acknowledged.
    let _ = shutdown_tx.send(true);
    match worker_handle.await {
        Ok(processed) => tracing::info!(processed, "Shutdown complete"),
        Err(err) => tracing::error!(error = %err, "Webhook worker panicked"),
    }

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn ports(
    config: &AppConfig,
    pool: PgPool,
    queue: ChannelWebhookQueue,
) -> Result<BillingPorts, Box<dyn Error + Send + Sync>> {
    let gateway = HttpPaymentGateway::new(config.gateway.request_timeout())?;

    Ok(BillingPorts {
        mandates: Arc::new(PostgresMandateRepository::new(pool.clone())),
        subscriptions: Arc::new(PostgresSubscriptionStore::new(pool.clone())),
        purchases: Arc::new(PostgresPurchaseRepository::new(pool.clone())),
        catalog: Arc::new(PostgresPriceCatalog::new(pool.clone())),
        gateway_config: Arc::new(PostgresGatewayConfigStore::new(pool)),
        gateway: Arc::new(gateway),
        notifier: Arc::new(LoggingNotifier::new()),
        queue: Arc::new(queue),
    })
}

fn settings(config: &AppConfig) -> Result<BillingSettings, Box<dyn Error + Send + Sync>> {
    let billing = &config.billing;
    if billing.cron_secret.is_none() {
        tracing::warn!("No cron secret configured; the recurring trigger is unauthenticated");
    }

    Ok(BillingSettings {
        gateway: config.gateway.clone(),
        urls: CallbackUrls::new(&billing.return_url, &billing.notify_url),
        redirects: RedirectTargets::new(&billing.success_url, &billing.failure_url)?,
        cron_secret: billing.cron_secret.clone(),
        recurring: RecurringBillingConfig {
            renewal_lead_days: billing.renewal_lead_days,
            concurrency: billing.scheduler_concurrency,
        },
        verify_timeout: config.gateway.request_timeout(),
    })
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::HeaderName::from_static("x-user-id")])
        .allow_origin(AllowOrigin::list(origins))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
