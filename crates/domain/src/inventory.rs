//! Per-product stock counters.

use common::ProductId;
use kv_store::KvStore;

use crate::error::DomainError;
use crate::optimistic::{RetryPolicy, parse_counter, update_counter};

/// Returns the store key holding a product's stock counter.
pub fn stock_key(product_id: &ProductId) -> String {
    format!("stock:{product_id}")
}

/// Stock counters, one per product, that never go below zero.
///
/// Counters are created implicitly by the first restock and never deleted;
/// an absent counter counts as zero when adjusting. Concurrent adjustments of
/// the same product are linearized through compare-and-swap on the counter's
/// revision, so queries never take a lock.
#[derive(Clone)]
pub struct Inventory<S: KvStore> {
    store: S,
    retry: RetryPolicy,
}

impl<S: KvStore> Inventory<S> {
    /// Creates an inventory with the default retry policy.
    pub fn new(store: S) -> Self {
        Self::with_retry_policy(store, RetryPolicy::default())
    }

    /// Creates an inventory with an explicit retry policy.
    pub fn with_retry_policy(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Applies a signed delta to a product's quantity.
    ///
    /// Fails with `InsufficientStock`, without writing anything, when the
    /// result would be negative. Returns the committed quantity.
    #[tracing::instrument(skip(self), fields(product_id = %product_id))]
    pub async fn adjust_quantity(
        &self,
        product_id: &ProductId,
        delta: i64,
    ) -> Result<i64, DomainError> {
        let key = stock_key(product_id);

        let result = update_counter(&self.store, &key, &self.retry, |current| {
            let available = current.unwrap_or(0);
            let next = available
                .checked_add(delta)
                .ok_or(DomainError::InvalidQuantity(delta))?;
            if next < 0 {
                return Err(DomainError::InsufficientStock {
                    product_id: product_id.clone(),
                    available,
                    requested: -delta,
                });
            }
            Ok(next)
        })
        .await;

        match &result {
            Ok(quantity) => {
                metrics::counter!("stock_adjustments_total").increment(1);
                tracing::debug!(delta, quantity, "stock adjusted");
            }
            Err(DomainError::InsufficientStock { .. }) => {
                metrics::counter!("stock_insufficient_total").increment(1);
            }
            Err(_) => {}
        }

        result
    }

    /// Reads a product's quantity.
    ///
    /// Fails with `ProductNotFound` if the product was never stocked.
    #[tracing::instrument(skip(self), fields(product_id = %product_id))]
    pub async fn query_quantity(&self, product_id: &ProductId) -> Result<i64, DomainError> {
        let key = stock_key(product_id);
        match self.store.get(&key).await? {
            Some(entry) => parse_counter(&key, &entry.value),
            None => Err(DomainError::ProductNotFound(product_id.clone())),
        }
    }

    /// Consumes `quantity` units of a product.
    pub async fn drop_stock(
        &self,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<i64, DomainError> {
        if quantity <= 0 {
            return Err(DomainError::InvalidQuantity(quantity));
        }
        self.adjust_quantity(product_id, -quantity).await
    }

    /// Restocks `quantity` units of a product.
    pub async fn put_stock(
        &self,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<i64, DomainError> {
        if quantity <= 0 {
            return Err(DomainError::InvalidQuantity(quantity));
        }
        self.adjust_quantity(product_id, quantity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_store::InMemoryKvStore;

    fn inventory() -> Inventory<InMemoryKvStore> {
        Inventory::new(InMemoryKvStore::new())
    }

    #[tokio::test]
    async fn first_put_creates_counter() {
        let inv = inventory();
        let product = ProductId::new("P1");

        assert_eq!(inv.put_stock(&product, 10).await.unwrap(), 10);
        assert_eq!(inv.query_quantity(&product).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn query_unknown_product_is_not_found() {
        let inv = inventory();
        let result = inv.query_quantity(&ProductId::new("ghost")).await;
        assert!(matches!(result, Err(DomainError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn drop_down_to_zero() {
        let inv = inventory();
        let product = ProductId::new("P1");
        inv.put_stock(&product, 5).await.unwrap();

        assert_eq!(inv.drop_stock(&product, 5).await.unwrap(), 0);
        assert_eq!(inv.query_quantity(&product).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn drop_below_zero_is_rejected_without_mutation() {
        let inv = inventory();
        let product = ProductId::new("P1");
        inv.put_stock(&product, 3).await.unwrap();

        let result = inv.drop_stock(&product, 5).await;
        match result {
            Err(DomainError::InsufficientStock {
                available,
                requested,
                ..
            }) => {
                assert_eq!(available, 3);
                assert_eq!(requested, 5);
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
        assert_eq!(inv.query_quantity(&product).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn drop_from_absent_counter_is_insufficient() {
        let inv = inventory();
        let product = ProductId::new("never-stocked");

        let result = inv.drop_stock(&product, 1).await;
        assert!(matches!(
            result,
            Err(DomainError::InsufficientStock { available: 0, .. })
        ));
        // Nothing was written.
        assert!(matches!(
            inv.query_quantity(&product).await,
            Err(DomainError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn non_positive_quantities_are_rejected() {
        let inv = inventory();
        let product = ProductId::new("P1");

        assert!(matches!(
            inv.put_stock(&product, 0).await,
            Err(DomainError::InvalidQuantity(0))
        ));
        assert!(matches!(
            inv.drop_stock(&product, -2).await,
            Err(DomainError::InvalidQuantity(-2))
        ));
    }

    #[tokio::test]
    async fn overflowing_delta_is_rejected() {
        let inv = inventory();
        let product = ProductId::new("P1");
        inv.put_stock(&product, 1).await.unwrap();

        let result = inv.adjust_quantity(&product, i64::MAX).await;
        assert!(matches!(result, Err(DomainError::InvalidQuantity(_))));
        assert_eq!(inv.query_quantity(&product).await.unwrap(), 1);
    }
}
