//! Stock service trait, HTTP client and in-process implementation.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use common::{ProductId, QuantityPayload, StockInfo};
use domain::{DomainError, Inventory};
use kv_store::KvStore;
use reqwest::{Client, StatusCode};

use crate::error::SagaError;

/// Operations the order saga needs from the stock service.
#[async_trait]
pub trait StockService: Send + Sync {
    /// Returns the number of units in stock.
    ///
    /// Fails with `ProductNotFound` if the product was never stocked.
    async fn query(&self, product_id: &ProductId) -> Result<i64, SagaError>;

    /// Deducts `quantity` units. Fails with `InsufficientStock` if there are
    /// not enough units, in which case nothing is deducted.
    async fn drop_stock(&self, product_id: &ProductId, quantity: i64) -> Result<(), SagaError>;

    /// Returns `quantity` units to stock.
    async fn put_stock(&self, product_id: &ProductId, quantity: i64) -> Result<(), SagaError>;
}

/// Client for a stock service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStockService {
    client: Client,
    base_url: String,
}

impl HttpStockService {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn adjust(
        &self,
        path: &str,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<(), SagaError> {
        let url = format!("{}/{}", self.base_url, path);
        // The stock service takes its body on GET.
        let response = self
            .client
            .get(&url)
            .query(&[("product_id", product_id.as_str())])
            .json(&QuantityPayload { quantity })
            .send()
            .await
            .map_err(|e| SagaError::StockService(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_ACCEPTABLE => Err(SagaError::InsufficientStock {
                product_id: product_id.clone(),
                requested: quantity,
            }),
            StatusCode::NOT_FOUND => Err(SagaError::ProductNotFound(product_id.clone())),
            StatusCode::BAD_REQUEST => Err(SagaError::InvalidQuantity(quantity)),
            status => Err(SagaError::StockService(format!(
                "{path} returned {status}"
            ))),
        }
    }
}

#[async_trait]
impl StockService for HttpStockService {
    #[tracing::instrument(skip(self))]
    async fn query(&self, product_id: &ProductId) -> Result<i64, SagaError> {
        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .query(&[("product_id", product_id.as_str())])
            .send()
            .await
            .map_err(|e| SagaError::StockService(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let info: StockInfo = response
                    .json()
                    .await
                    .map_err(|e| SagaError::StockService(e.to_string()))?;
                Ok(info.quantity)
            }
            StatusCode::NOT_FOUND => Err(SagaError::ProductNotFound(product_id.clone())),
            status => Err(SagaError::StockService(format!("query returned {status}"))),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn drop_stock(&self, product_id: &ProductId, quantity: i64) -> Result<(), SagaError> {
        self.adjust("drop", product_id, quantity).await
    }

    #[tracing::instrument(skip(self))]
    async fn put_stock(&self, product_id: &ProductId, quantity: i64) -> Result<(), SagaError> {
        self.adjust("put", product_id, quantity).await
    }
}

/// A failure `LocalStockService` can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Behave as if another order took the units first.
    InsufficientStock,
    /// Behave as if the service was unreachable.
    Unavailable,
}

#[derive(Debug, Default)]
struct Injections {
    next_drop: Option<InjectedFailure>,
    next_put: Option<InjectedFailure>,
}

/// Stock service backed directly by an [`Inventory`] in the same process.
///
/// Supports one-shot failure injection for exercising compensation paths.
#[derive(Clone)]
pub struct LocalStockService<S: KvStore> {
    inventory: Inventory<S>,
    injections: Arc<Mutex<Injections>>,
}

impl<S: KvStore> LocalStockService<S> {
    pub fn new(inventory: Inventory<S>) -> Self {
        Self {
            inventory,
            injections: Arc::default(),
        }
    }

    pub fn inventory(&self) -> &Inventory<S> {
        &self.inventory
    }

    /// Makes the next `drop_stock` call fail without touching stock.
    pub fn fail_next_drop(&self, failure: InjectedFailure) {
        self.lock().next_drop = Some(failure);
    }

    /// Makes the next `put_stock` call fail without touching stock.
    pub fn fail_next_put(&self, failure: InjectedFailure) {
        self.lock().next_put = Some(failure);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Injections> {
        self.injections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn injected(
        failure: Option<InjectedFailure>,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<(), SagaError> {
        match failure {
            None => Ok(()),
            Some(InjectedFailure::InsufficientStock) => Err(SagaError::InsufficientStock {
                product_id: product_id.clone(),
                requested: quantity,
            }),
            Some(InjectedFailure::Unavailable) => Err(SagaError::StockService(
                "stock service unavailable".to_string(),
            )),
        }
    }
}

/// Maps inventory errors onto what the HTTP stock service would answer.
fn from_domain(e: DomainError, product_id: &ProductId, quantity: i64) -> SagaError {
    match e {
        DomainError::InsufficientStock { .. } => SagaError::InsufficientStock {
            product_id: product_id.clone(),
            requested: quantity,
        },
        DomainError::ProductNotFound(id) => SagaError::ProductNotFound(id),
        DomainError::InvalidQuantity(q) => SagaError::InvalidQuantity(q),
        other => SagaError::StockService(other.to_string()),
    }
}

#[async_trait]
impl<S: KvStore> StockService for LocalStockService<S> {
    async fn query(&self, product_id: &ProductId) -> Result<i64, SagaError> {
        self.inventory
            .query_quantity(product_id)
            .await
            .map_err(|e| from_domain(e, product_id, 0))
    }

    async fn drop_stock(&self, product_id: &ProductId, quantity: i64) -> Result<(), SagaError> {
        let failure = self.lock().next_drop.take();
        Self::injected(failure, product_id, quantity)?;
        self.inventory
            .drop_stock(product_id, quantity)
            .await
            .map(|_| ())
            .map_err(|e| from_domain(e, product_id, quantity))
    }

    async fn put_stock(&self, product_id: &ProductId, quantity: i64) -> Result<(), SagaError> {
        let failure = self.lock().next_put.take();
        Self::injected(failure, product_id, quantity)?;
        self.inventory
            .put_stock(product_id, quantity)
            .await
            .map(|_| ())
            .map_err(|e| from_domain(e, product_id, quantity))
    }
}
