//! Order service endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use common::{OrderCreatedResponse, OrderId, PlaceOrderRequest, UserId};
use domain::Order;
use kv_store::KvStore;
use saga::{OrderPlacement, StockService};
use serde::Deserialize;

use crate::error::ApiError;
use crate::routes::{json_body, required};

/// Shared state of the orders service.
pub struct OrdersState<S: KvStore, St: StockService> {
    pub placement: OrderPlacement<S, St>,
}

impl<S: KvStore, St: StockService> OrdersState<S, St> {
    pub fn new(placement: OrderPlacement<S, St>) -> Self {
        Self { placement }
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderParams {
    pub user_id: Option<String>,
    pub order_id: Option<String>,
}

fn user_id(value: Option<String>) -> Result<UserId, ApiError> {
    required(value, || ApiError::NotFound("User ID not found".to_string())).map(UserId::new)
}

/// POST /: place an order for the user.
#[tracing::instrument(skip(state, body))]
pub async fn place<S: KvStore + 'static, St: StockService + 'static>(
    State(state): State<Arc<OrdersState<S, St>>>,
    Query(params): Query<OrderParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let user_id = user_id(params.user_id)?;
    let request: PlaceOrderRequest = json_body(&body)?;

    let order = state
        .placement
        .place(&user_id, &request.product_id, request.quantity)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse { order_id: order.id }),
    ))
}

/// GET /: the user's orders, oldest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: KvStore + 'static, St: StockService + 'static>(
    State(state): State<Arc<OrdersState<S, St>>>,
    Query(params): Query<OrderParams>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let user_id = user_id(params.user_id)?;
    Ok(Json(state.placement.list(&user_id).await?))
}

/// DELETE /: cancel an order and restock its units.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: KvStore + 'static, St: StockService + 'static>(
    State(state): State<Arc<OrdersState<S, St>>>,
    Query(params): Query<OrderParams>,
) -> Result<StatusCode, ApiError> {
    let user_id = user_id(params.user_id)?;
    let order_id = required(params.order_id, || {
        ApiError::NotFound("order_id parameter is missing".to_string())
    })
    .map(OrderId::new)?;

    state.placement.cancel(&user_id, &order_id).await?;
    Ok(StatusCode::OK)
}
