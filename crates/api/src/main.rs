//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::routes::{AppState, Gateway, Provider};
use domain::{CheckoutProduct, GameRef, Money, ProductId};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{
    CatalogStore, InMemoryCatalogStore, InMemoryOrderStore, OrderStore, PostgresCatalogStore,
    PostgresOrderStore,
};
use saga::{
    InMemoryFulfillmentProvider, InMemoryPaymentGateway, SnapGatewayClient, SystemClock,
    TopUpProviderClient,
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

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let (json, text) = match config.log_format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Text => (None, Some(tracing_subscriber::fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();
}

fn payment_gateway(config: &Config) -> Gateway {
    match &config.gateway {
        Some(gateway) => {
            let client = SnapGatewayClient::new(gateway.server_key.clone(), gateway.production)
                .expect("failed to build payment gateway client");
            tracing::info!(production = gateway.production, "using hosted payment gateway");
            Arc::new(client)
        }
        None => {
            tracing::warn!("GATEWAY_SERVER_KEY not set, using in-memory payment gateway");
            Arc::new(InMemoryPaymentGateway::new())
        }
    }
}

fn fulfillment_provider(config: &Config) -> Provider {
    match &config.provider {
        Some(provider) => {
            let client = TopUpProviderClient::new(
                provider.base_url.clone(),
                provider.api_id.clone(),
                provider.api_key.clone(),
            )
            .expect("failed to build fulfillment provider client");
            tracing::info!(base_url = %provider.base_url, "using top-up provider");
            Arc::new(client)
        }
        None => {
            tracing::warn!("provider credentials not set, using in-memory fulfillment provider");
            Arc::new(InMemoryFulfillmentProvider::new())
        }
    }
}

/// Product available when running without a database.
fn demo_product() -> CheckoutProduct {
    CheckoutProduct {
        id: ProductId::new("ml-86"),
        name: "86 Diamonds".to_string(),
        price: Money::new(20000),
        discount_price: Some(Money::new(19000)),
        is_active: true,
        provider_code: "ML86".to_string(),
        game: GameRef {
            slug: "mobile-legends".to_string(),
            name: "Mobile Legends".to_string(),
            code: "mobilelegends".to_string(),
        },
    }
}

async fn serve<S, C>(config: &Config, state: Arc<AppState<S, C>>, metrics_handle: PrometheusHandle)
where
    S: OrderStore + Clone + 'static,
    C: CatalogStore + 'static,
{
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
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick adapters
    let gateway = payment_gateway(&config);
    let provider = fulfillment_provider(&config);
    let clock = Arc::new(SystemClock);
    let saga_config = config.saga_config();

    // 4. Pick storage and serve
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to database");
            let store = PostgresOrderStore::new(pool.clone());
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            let catalog = PostgresCatalogStore::new(pool);

            let state = api::build_state(store, catalog, gateway, provider, clock, saga_config);
            serve(&config, state, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory");
            let store = InMemoryOrderStore::new();
            let catalog = InMemoryCatalogStore::with_products([demo_product()]);

            let state = api::build_state(store, catalog, gateway, provider, clock, saga_config);
            serve(&config, state, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
