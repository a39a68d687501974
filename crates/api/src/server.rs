//! Process bootstrap shared by the service binaries.

use std::sync::Arc;

use axum::Router;
use domain::{CartStore, Catalog, Inventory, OrderLedger};
use kv_store::{InMemoryKvStore, KvStore, KvStoreError, RedisKvStore};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use saga::{
    Checkout, HttpOrdersService, HttpStockService, OrderPlacement, base_url, http_client,
};
use thiserror::Error;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LogFormat, Service, StoreBackend};
use crate::routes::cart::CartState;
use crate::routes::orders::OrdersState;
use crate::routes::products::ProductsState;
use crate::routes::stock::StockState;

/// Errors that stop a service from starting or serving.
#[derive(Debug, Error)]
pub enum BootError {
    #[error("Store error: {0}")]
    Store(#[from] KvStoreError),

    #[error("Failed to install metrics recorder: {0}")]
    Metrics(#[from] BuildError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Installs the global tracing subscriber.
pub fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
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

/// Binds the configured address and serves `app` until shutdown.
pub async fn serve(app: Router, config: &Config) -> Result<(), BootError> {
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(service = %config.service, %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(service = %config.service, "server shut down gracefully");
    Ok(())
}

/// Builds the router of one service on top of a connected store.
fn build_app<S: KvStore + Clone + 'static>(
    store: S,
    config: &Config,
    metrics_handle: PrometheusHandle,
) -> Result<Router, BootError> {
    let retry = config.retry_policy();

    let app = match config.service {
        Service::Stock => {
            let inventory = Inventory::with_retry_policy(store, retry);
            crate::create_stock_app(Arc::new(StockState::new(inventory)), metrics_handle)
        }
        Service::Orders => {
            let stock = HttpStockService::new(
                http_client(config.request_timeout)?,
                base_url(&config.stock_host),
            );
            let placement = OrderPlacement::new(OrderLedger::new(store), stock);
            crate::create_orders_app(Arc::new(OrdersState::new(placement)), metrics_handle)
        }
        Service::Cart => {
            let orders = HttpOrdersService::new(
                http_client(config.request_timeout)?,
                base_url(&config.orders_host),
            );
            let checkout = Checkout::new(CartStore::with_retry_policy(store, retry), orders);
            crate::create_cart_app(Arc::new(CartState::new(checkout)), metrics_handle)
        }
        Service::Products => {
            crate::create_products_app(
                Arc::new(ProductsState::new(Catalog::new(store))),
                metrics_handle,
            )
        }
    };
    Ok(app)
}

async fn run_with_store<S: KvStore + Clone + 'static>(
    store: S,
    config: &Config,
    metrics_handle: PrometheusHandle,
) -> Result<(), BootError> {
    store.ping().await?;
    let app = build_app(store, config, metrics_handle)?;
    serve(app, config).await
}

/// Runs a service: loads configuration, installs tracing and metrics,
/// connects the store and serves until shutdown.
pub async fn run(service: Service) -> Result<(), BootError> {
    let config = Config::from_env(service);
    init_tracing(&config);

    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    match config.store_backend() {
        StoreBackend::Memory => {
            tracing::warn!(%service, "using the in-memory store; state is not shared");
            run_with_store(InMemoryKvStore::new(), &config, metrics_handle).await
        }
        StoreBackend::Redis(host) => {
            let store = RedisKvStore::connect_host(&host).await?;
            tracing::info!(%service, redis = %host, "connected to store");
            run_with_store(store, &config, metrics_handle).await
        }
    }
}
