//! Cart service endpoints, including checkout.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use common::{CartLine, OrderId, ProductId, UserId};
use kv_store::KvStore;
use saga::{Checkout, OrdersService};
use serde::Deserialize;

use crate::error::ApiError;
use crate::routes::{json_body, required};

/// Shared state of the cart service.
pub struct CartState<S: KvStore, O: OrdersService> {
    pub checkout: Checkout<S, O>,
}

impl<S: KvStore, O: OrdersService> CartState<S, O> {
    pub fn new(checkout: Checkout<S, O>) -> Self {
        Self { checkout }
    }
}

#[derive(Debug, Deserialize)]
pub struct CartParams {
    pub user_id: Option<String>,
    pub product_id: Option<String>,
    pub quantity: Option<String>,
}

fn user_id(value: Option<String>) -> Result<UserId, ApiError> {
    required(value, || {
        ApiError::BadRequest("user_id parameter is missing".to_string())
    })
    .map(UserId::new)
}

/// GET /: the user's cart lines.
#[tracing::instrument(skip(state))]
pub async fn list<S: KvStore + 'static, O: OrdersService + 'static>(
    State(state): State<Arc<CartState<S, O>>>,
    Query(params): Query<CartParams>,
) -> Result<Json<Vec<CartLine>>, ApiError> {
    let user_id = user_id(params.user_id)?;
    Ok(Json(state.checkout.cart().lines(&user_id).await?))
}

/// POST /: add units of a product to the cart.
#[tracing::instrument(skip(state, body))]
pub async fn add<S: KvStore + 'static, O: OrdersService + 'static>(
    State(state): State<Arc<CartState<S, O>>>,
    Query(params): Query<CartParams>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let user_id = user_id(params.user_id)?;
    let line: CartLine = json_body(&body)?;

    state
        .checkout
        .cart()
        .add(&user_id, &line.product_id, line.quantity)
        .await?;
    Ok(StatusCode::CREATED)
}

/// DELETE /: take units of a product out of the cart (one by default).
#[tracing::instrument(skip(state))]
pub async fn remove<S: KvStore + 'static, O: OrdersService + 'static>(
    State(state): State<Arc<CartState<S, O>>>,
    Query(params): Query<CartParams>,
) -> Result<StatusCode, ApiError> {
    let user_id = user_id(params.user_id)?;
    let product_id = required(params.product_id, || {
        ApiError::BadRequest("product_id parameter is missing".to_string())
    })
    .map(ProductId::new)?;
    let quantity = match params.quantity.filter(|q| !q.is_empty()) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::BadRequest("invalid quantity parameter".to_string()))?,
        None => 1,
    };

    state
        .checkout
        .cart()
        .remove(&user_id, &product_id, quantity)
        .await?;
    Ok(StatusCode::OK)
}

/// POST /checkout: order every line in the cart.
#[tracing::instrument(skip(state))]
pub async fn checkout<S: KvStore + 'static, O: OrdersService + 'static>(
    State(state): State<Arc<CartState<S, O>>>,
    Query(params): Query<CartParams>,
) -> Result<(StatusCode, Json<Vec<OrderId>>), ApiError> {
    let user_id = required(params.user_id, || {
        ApiError::NotFound("user_id parameter is missing".to_string())
    })
    .map(UserId::new)?;

    let order_ids = state.checkout.checkout(&user_id).await?;
    Ok((StatusCode::CREATED, Json(order_ids)))
}
