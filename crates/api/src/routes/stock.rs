//! Stock service endpoints.
//!
//! `drop` and `put` are GET requests carrying a JSON body, which is what the
//! orders service sends.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use common::{ProductId, QuantityPayload, StockInfo};
use domain::Inventory;
use kv_store::KvStore;
use serde::Deserialize;

use crate::error::ApiError;
use crate::routes::{json_body, required};

/// Shared state of the stock service.
pub struct StockState<S: KvStore> {
    pub inventory: Inventory<S>,
}

impl<S: KvStore> StockState<S> {
    pub fn new(inventory: Inventory<S>) -> Self {
        Self { inventory }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductParams {
    pub product_id: Option<String>,
}

fn product_id(params: ProductParams) -> Result<ProductId, ApiError> {
    required(params.product_id, || {
        ApiError::NotFound("product_id parameter is missing".to_string())
    })
    .map(ProductId::new)
}

/// GET /: current quantity of a product.
#[tracing::instrument(skip(state))]
pub async fn query<S: KvStore + 'static>(
    State(state): State<Arc<StockState<S>>>,
    Query(params): Query<ProductParams>,
) -> Result<Json<StockInfo>, ApiError> {
    let product_id = product_id(params)?;
    let quantity = state.inventory.query_quantity(&product_id).await?;
    Ok(Json(StockInfo {
        product_id,
        quantity,
    }))
}

/// GET /drop: consume units; 406 if there are not enough.
#[tracing::instrument(skip(state, body))]
pub async fn drop_units<S: KvStore + 'static>(
    State(state): State<Arc<StockState<S>>>,
    Query(params): Query<ProductParams>,
    body: Bytes,
) -> Result<Json<StockInfo>, ApiError> {
    let product_id = product_id(params)?;
    let payload: QuantityPayload = json_body(&body)?;
    let quantity = state
        .inventory
        .drop_stock(&product_id, payload.quantity)
        .await?;
    Ok(Json(StockInfo {
        product_id,
        quantity,
    }))
}

/// GET /put: restock units.
#[tracing::instrument(skip(state, body))]
pub async fn put_units<S: KvStore + 'static>(
    State(state): State<Arc<StockState<S>>>,
    Query(params): Query<ProductParams>,
    body: Bytes,
) -> Result<Json<StockInfo>, ApiError> {
    let product_id = product_id(params)?;
    let payload: QuantityPayload = json_body(&body)?;
    let quantity = state
        .inventory
        .put_stock(&product_id, payload.quantity)
        .await?;
    Ok(Json(StockInfo {
        product_id,
        quantity,
    }))
}
