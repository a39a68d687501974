//! Orders service trait, HTTP client and in-process implementation.

use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderCreatedResponse, OrderId, PlaceOrderRequest, ProductId, UserId};
use kv_store::KvStore;
use reqwest::{Client, StatusCode};

use crate::error::SagaError;
use crate::placement::OrderPlacement;
use crate::services::StockService;

/// Operations the checkout saga needs from the orders service.
#[async_trait]
pub trait OrdersService: Send + Sync {
    /// Places one order and returns its ID.
    async fn place(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<OrderId, SagaError>;
}

/// Client for an orders service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpOrdersService {
    client: Client,
    base_url: String,
}

impl HttpOrdersService {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl OrdersService for HttpOrdersService {
    #[tracing::instrument(skip(self))]
    async fn place(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<OrderId, SagaError> {
        let body = PlaceOrderRequest {
            product_id: product_id.clone(),
            quantity,
        };
        let response = self
            .client
            .post(format!("{}/", self.base_url))
            .query(&[("user_id", user_id.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| SagaError::OrdersService(e.to_string()))?;

        match response.status() {
            StatusCode::CREATED => {
                let created: OrderCreatedResponse = response
                    .json()
                    .await
                    .map_err(|e| SagaError::OrdersService(e.to_string()))?;
                Ok(created.order_id)
            }
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {
                Err(SagaError::UnknownProduct(product_id.clone()))
            }
            StatusCode::NOT_ACCEPTABLE => Err(SagaError::InsufficientStock {
                product_id: product_id.clone(),
                requested: quantity,
            }),
            status => Err(SagaError::OrdersService(format!(
                "placement returned {status}"
            ))),
        }
    }
}

/// Orders service running the placement saga in the same process.
pub struct LocalOrdersService<S: KvStore, St: StockService> {
    placement: Arc<OrderPlacement<S, St>>,
}

impl<S: KvStore, St: StockService> Clone for LocalOrdersService<S, St> {
    fn clone(&self) -> Self {
        Self {
            placement: Arc::clone(&self.placement),
        }
    }
}

impl<S: KvStore, St: StockService> LocalOrdersService<S, St> {
    pub fn new(placement: OrderPlacement<S, St>) -> Self {
        Self {
            placement: Arc::new(placement),
        }
    }
}

#[async_trait]
impl<S: KvStore, St: StockService> OrdersService for LocalOrdersService<S, St> {
    async fn place(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<OrderId, SagaError> {
        let order = self.placement.place(user_id, product_id, quantity).await?;
        Ok(order.id)
    }
}
