//! HTTP surface for the order workflow.
//!
//! One axum application serves the orchestrator routes (`/v1/orders`) and
//! the inventory engine routes (`/v1/inventory/*`), with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use chrono::Utc;
use inventory::{EngineConfig, InMemoryInventoryStore, InventoryStore, ReservationEngine};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{
    IdempotencyStore, InMemoryIdempotencyStore, InMemoryOrderStore, OrderStore,
};
use saga::{
    CatalogService, InMemoryCatalogService, InMemoryPaymentService, InventoryService,
    LocalInventoryService, PaymentService, SagaConfig, SagaCoordinator,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<S, K, V>
where
    S: OrderStore + Clone + 'static,
    K: IdempotencyStore + 'static,
    V: InventoryStore + 'static,
{
    pub coordinator: SagaCoordinator<S, K>,
    pub orders: S,
    pub engine: Arc<ReservationEngine<V>>,
}

/// Creates the axum application router with all routes and shared state.
pub fn create_app<S, K, V>(
    state: Arc<AppState<S, K, V>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    S: OrderStore + Clone + 'static,
    K: IdempotencyStore + 'static,
    V: InventoryStore + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/v1/orders",
            post(routes::orders::create::<S, K, V>).get(routes::orders::list::<S, K, V>),
        )
        .route("/v1/orders/{id}", get(routes::orders::get::<S, K, V>))
        .route(
            "/v1/inventory/reserve",
            post(routes::inventory::reserve::<S, K, V>),
        )
        .route(
            "/v1/inventory/reserve/confirm",
            post(routes::inventory::confirm::<S, K, V>),
        )
        .route(
            "/v1/inventory/release",
            post(routes::inventory::release::<S, K, V>),
        )
        .route(
            "/v1/inventory/ship",
            post(routes::inventory::ship::<S, K, V>),
        )
        .route(
            "/v1/inventory/reaper/expired",
            post(routes::inventory::reap_expired::<S, K, V>),
        )
        .route(
            "/v1/inventory/{productId}",
            get(routes::inventory::stock::<S, K, V>),
        )
        .route(
            "/v1/inventory/{productId}/movements",
            get(routes::inventory::movements::<S, K, V>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires stores, engine, adapters, and coordinator into shared state.
///
/// `inventory_override` swaps the in-process engine gateway for a remote
/// one (split deployment); the engine itself still serves this process's
/// `/v1/inventory/*` routes.
pub fn build_state<S, K, V>(
    orders: S,
    idempotency: K,
    inventory_store: V,
    catalog: Arc<dyn CatalogService>,
    payment: Arc<dyn PaymentService>,
    inventory_override: Option<Arc<dyn InventoryService>>,
    config: &Config,
) -> Arc<AppState<S, K, V>>
where
    S: OrderStore + Clone + 'static,
    K: IdempotencyStore + 'static,
    V: InventoryStore + 'static,
{
    let engine = Arc::new(ReservationEngine::new(
        inventory_store,
        EngineConfig {
            reservation_ttl: chrono::Duration::minutes(config.reservation_ttl_minutes),
            low_stock_threshold: config.low_stock_threshold,
        },
    ));

    let gateway: Arc<dyn InventoryService> = inventory_override
        .unwrap_or_else(|| Arc::new(LocalInventoryService::new(engine.clone())));

    let coordinator = SagaCoordinator::new(
        orders.clone(),
        idempotency,
        catalog,
        gateway,
        payment,
        SagaConfig {
            totals: domain::TotalsConfig {
                tax_rate: config.tax_rate,
                shipping_cost: None,
            },
        },
    );

    Arc::new(AppState {
        coordinator,
        orders,
        engine,
    })
}

/// Creates in-memory state with in-memory service doubles.
///
/// Returns the doubles alongside the state so tests can seed products and
/// inject failures.
pub fn create_default_state() -> (
    Arc<AppState<InMemoryOrderStore, InMemoryIdempotencyStore, InMemoryInventoryStore>>,
    InMemoryCatalogService,
    InMemoryPaymentService,
) {
    let catalog = InMemoryCatalogService::new();
    let payment = InMemoryPaymentService::new();

    let state = build_state(
        InMemoryOrderStore::new(),
        InMemoryIdempotencyStore::new(),
        InMemoryInventoryStore::new(),
        Arc::new(catalog.clone()),
        Arc::new(payment.clone()),
        None,
        &Config::default(),
    );

    (state, catalog, payment)
}

/// Spawns the periodic reaper that expires overdue reservations.
pub fn spawn_reaper<V>(engine: Arc<ReservationEngine<V>>, interval_secs: u64)
where
    V: InventoryStore + 'static,
{
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
        // The immediate first tick would race startup; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match engine.expire_due(Utc::now()).await {
                Ok(outcome) if outcome.expired_count > 0 => {
                    tracing::info!(expired = outcome.expired_count, "reaper pass complete");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "reaper pass failed"),
            }
        }
    });
}
