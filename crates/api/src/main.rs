//! API server entry point.

use std::sync::Arc;
use std::time::Duration;

use api::config::Config;
use api::{AppState, build_state, create_app, spawn_reaper};
use inventory::{InMemoryInventoryStore, InventoryStore, PostgresInventoryStore};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{
    IdempotencyStore, InMemoryIdempotencyStore, InMemoryOrderStore, OrderStore,
    PostgresIdempotencyStore, PostgresOrderStore,
};
use saga::{
    CatalogService, HttpCatalogService, HttpInventoryService, HttpPaymentService,
    InMemoryCatalogService, InMemoryPaymentService, InventoryService, PaymentService,
};
use sqlx::postgres::PgPoolOptions;
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

async fn serve<S, K, V>(
    state: Arc<AppState<S, K, V>>,
    config: &Config,
    metrics_handle: PrometheusHandle,
) where
    S: OrderStore + Clone + 'static,
    K: IdempotencyStore + 'static,
    V: InventoryStore + 'static,
{
    spawn_reaper(state.engine.clone(), config.reaper_interval_secs);

    let app = create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Remote adapters, or in-memory doubles when no URL is configured
    let catalog: Arc<dyn CatalogService> = match &config.catalog_base_url {
        Some(url) => Arc::new(HttpCatalogService::new(
            url.clone(),
            Duration::from_secs(config.catalog_timeout_secs),
        )),
        None => {
            tracing::warn!("CATALOG_BASE_URL not set, using in-memory catalog");
            Arc::new(InMemoryCatalogService::new())
        }
    };
    let payment: Arc<dyn PaymentService> = match &config.payment_base_url {
        Some(url) => Arc::new(HttpPaymentService::new(
            url.clone(),
            Duration::from_secs(config.payment_timeout_secs),
        )),
        None => {
            tracing::warn!("PAYMENT_BASE_URL not set, using in-memory payment gateway");
            Arc::new(InMemoryPaymentService::new())
        }
    };
    let inventory_override: Option<Arc<dyn InventoryService>> =
        config.inventory_base_url.as_ref().map(|url| {
            Arc::new(HttpInventoryService::new(
                url.clone(),
                Duration::from_secs(config.inventory_timeout_secs),
            )) as Arc<dyn InventoryService>
        });

    // 4. Stores: PostgreSQL when configured, in-memory otherwise
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(&url)
                .await
                .expect("failed to connect to database");

            let orders = PostgresOrderStore::new(pool.clone());
            orders.run_migrations().await.expect("migrations failed");

            let state = build_state(
                orders,
                PostgresIdempotencyStore::new(pool.clone()),
                PostgresInventoryStore::new(pool),
                catalog,
                payment,
                inventory_override,
                &config,
            );
            serve(state, &config, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
            let state = build_state(
                InMemoryOrderStore::new(),
                InMemoryIdempotencyStore::new(),
                InMemoryInventoryStore::new(),
                catalog,
                payment,
                inventory_override,
                &config,
            );
            serve(state, &config, metrics_handle).await;
        }
    }
}
