//! HTTP API for the top-up checkout saga.
//!
//! Exposes checkout, gateway notifications and order reconciliation triggers
//! as REST endpoints, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{CatalogStore, OrderStore};
use saga::{Clock, OrderManager, ReconciliationEngine, SagaConfig};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::{AppState, Gateway, Provider};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, C>(state: Arc<AppState<S, C>>, metrics_handle: PrometheusHandle) -> Router
where
    S: OrderStore + Clone + 'static,
    C: CatalogStore + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/checkout", post(routes::checkout::create::<S, C>))
        .route("/orders/{order_number}", get(routes::orders::get::<S, C>))
        .route(
            "/orders/{order_number}/refresh",
            post(routes::orders::refresh::<S, C>),
        )
        .route(
            "/orders/{order_number}/process",
            post(routes::orders::process::<S, C>),
        )
        .route(
            "/orders/{order_number}/provider-status",
            post(routes::orders::provider_status::<S, C>),
        )
        .route(
            "/orders/{order_number}/cancel",
            post(routes::orders::cancel::<S, C>),
        )
        .route(
            "/payments/notification",
            post(routes::payments::notify::<S, C>),
        )
        .route("/accounts/verify", post(routes::accounts::verify::<S, C>))
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

/// Wires the order manager and reconciliation engine over shared adapters.
pub fn build_state<S, C>(
    store: S,
    catalog: C,
    gateway: Gateway,
    provider: Provider,
    clock: Arc<dyn Clock>,
    config: SagaConfig,
) -> Arc<AppState<S, C>>
where
    S: OrderStore + Clone + 'static,
    C: CatalogStore + 'static,
{
    let manager = OrderManager::new(
        store.clone(),
        catalog,
        gateway.clone(),
        clock.clone(),
        config.clone(),
    );
    let engine = ReconciliationEngine::new(store, gateway, provider.clone(), clock, config);

    Arc::new(AppState {
        manager,
        engine,
        provider,
    })
}
