//! Product catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use common::{CreateProductRequest, ProductId};
use domain::{Catalog, NewProduct, PAGE_SIZE, ProductPage};
use kv_store::KvStore;
use serde::Deserialize;

use crate::error::ApiError;
use crate::routes::{json_body, required};

/// Shared state of the products service.
pub struct ProductsState<S: KvStore> {
    pub catalog: Catalog<S>,
}

impl<S: KvStore> ProductsState<S> {
    pub fn new(catalog: Catalog<S>) -> Self {
        Self { catalog }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub from: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub id: Option<String>,
}

/// GET /: one page of products, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: KvStore + 'static>(
    State(state): State<Arc<ProductsState<S>>>,
    Query(params): Query<ListParams>,
) -> Result<Json<ProductPage>, ApiError> {
    let page = state
        .catalog
        .list(params.from.as_deref(), PAGE_SIZE)
        .await?;
    Ok(Json(page))
}

/// POST /: create a product; the body of the response is its ID.
#[tracing::instrument(skip(state, body))]
pub async fn create<S: KvStore + 'static>(
    State(state): State<Arc<ProductsState<S>>>,
    body: Bytes,
) -> Result<(StatusCode, String), ApiError> {
    let request: CreateProductRequest = json_body(&body)?;
    let product = state
        .catalog
        .create(NewProduct::new(request.name, request.category))
        .await?;
    Ok((StatusCode::CREATED, product.id.to_string()))
}

/// DELETE /: remove a product from the catalog.
#[tracing::instrument(skip(state))]
pub async fn delete<S: KvStore + 'static>(
    State(state): State<Arc<ProductsState<S>>>,
    Query(params): Query<DeleteParams>,
) -> Result<StatusCode, ApiError> {
    let id = required(params.id, || {
        ApiError::NotFound("id parameter is missing".to_string())
    })?;
    state.catalog.delete(&ProductId::new(id)).await?;
    Ok(StatusCode::OK)
}
