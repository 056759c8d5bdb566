//! API server entry point.

use std::sync::Arc;

use api::config::{Config, PaymentsMode};
use domain::{HmacGateway, MockProvider, NoopNotifier, Notifier, PaymentProvider};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use store::{MemoryStore, PostgresStore, Store};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn serve<S: Store + Clone + Send + Sync + 'static>(
    store: S,
    provider: Arc<dyn PaymentProvider>,
    notifier: Arc<dyn Notifier>,
    config: &Config,
    metrics_handle: PrometheusHandle,
) {
    let state = api::create_state(store, provider, notifier, config.admin_token.clone());
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Select the payment provider
    let provider: Arc<dyn PaymentProvider> = match config.payments_mode {
        PaymentsMode::Mock => {
            tracing::warn!("running with the mock payment provider; not for production");
            Arc::new(MockProvider::new())
        }
        PaymentsMode::Gateway => Arc::new(HmacGateway::new(
            config.gateway_key_id.clone(),
            config.gateway_key_secret.clone(),
            config.gateway_webhook_secret.clone(),
        )),
    };
    let notifier: Arc<dyn Notifier> = Arc::new(NoopNotifier);

    // 4. Select the store and serve
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresStore::new(pool);
            store.run_migrations().await.expect("migrations failed");
            tracing::info!("using PostgreSQL store");
            serve(store, provider, notifier, &config, metrics_handle).await;
        }
        None => {
            tracing::info!("using in-memory store");
            serve(
                MemoryStore::new(),
                provider,
                notifier,
                &config,
                metrics_handle,
            )
            .await;
        }
    }

    tracing::info!("server shut down gracefully");
}
