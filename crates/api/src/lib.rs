//! HTTP surface of the cart, orders, products and stock services.
//!
//! Each service gets its own router over shared state, plus the same
//! `/health` and `/metrics` endpoints, request tracing and CORS. The
//! binaries in `src/bin` wire a store and downstream clients into these
//! routers and serve them.

pub mod config;
pub mod error;
pub mod routes;
pub mod server;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use kv_store::KvStore;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{OrdersService, StockService};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::cart::CartState;
use routes::orders::OrdersState;
use routes::products::ProductsState;
use routes::stock::StockState;

/// Adds the endpoints and layers every service shares.
fn with_common<S: KvStore + Clone + 'static>(
    service_router: Router,
    store: S,
    metrics_handle: PrometheusHandle,
) -> Router {
    let health_router = Router::new()
        .route("/health", get(routes::health::check::<S>))
        .with_state(store);

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    service_router
        .merge(health_router)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the stock service router.
pub fn create_stock_app<S: KvStore + Clone + 'static>(
    state: Arc<StockState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let store = state.inventory.store().clone();
    let router = Router::new()
        .route("/", get(routes::stock::query::<S>))
        .route("/drop", get(routes::stock::drop_units::<S>))
        .route("/put", get(routes::stock::put_units::<S>))
        .with_state(state);
    with_common(router, store, metrics_handle)
}

/// Creates the orders service router.
pub fn create_orders_app<S, St>(
    state: Arc<OrdersState<S, St>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    S: KvStore + Clone + 'static,
    St: StockService + 'static,
{
    let store = state.placement.ledger().store().clone();
    let router = Router::new()
        .route(
            "/",
            post(routes::orders::place::<S, St>)
                .get(routes::orders::list::<S, St>)
                .delete(routes::orders::cancel::<S, St>),
        )
        .with_state(state);
    with_common(router, store, metrics_handle)
}

/// Creates the cart service router.
pub fn create_cart_app<S, O>(state: Arc<CartState<S, O>>, metrics_handle: PrometheusHandle) -> Router
where
    S: KvStore + Clone + 'static,
    O: OrdersService + 'static,
{
    let store = state.checkout.cart().store().clone();
    let router = Router::new()
        .route(
            "/",
            get(routes::cart::list::<S, O>)
                .post(routes::cart::add::<S, O>)
                .delete(routes::cart::remove::<S, O>),
        )
        .route("/checkout", post(routes::cart::checkout::<S, O>))
        .with_state(state);
    with_common(router, store, metrics_handle)
}

/// Creates the products service router.
pub fn create_products_app<S: KvStore + Clone + 'static>(
    state: Arc<ProductsState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let store = state.catalog.store().clone();
    let router = Router::new()
        .route(
            "/",
            get(routes::products::list::<S>)
                .post(routes::products::create::<S>)
                .delete(routes::products::delete::<S>),
        )
        .with_state(state);
    with_common(router, store, metrics_handle)
}
