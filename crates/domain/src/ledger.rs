//! Per-user order records.
//!
//! The ledger is pure storage: it never talks to the stock service. Keeping
//! "order exists" and "stock was deducted" in agreement is the job of the
//! placement saga that drives it.

use common::{OrderId, ProductId, UserId, now_nanos};
use kv_store::{KvStore, KvStoreExt, SetOptions};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Lifecycle of an order once it is in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Stock has been deducted and the order awaits shipping.
    #[default]
    Preparing,
    Shipped,
    Arrived,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Preparing => "preparing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Arrived => "arrived",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An order record as stored and as returned by the order listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: i64,
    /// Creation time in nanoseconds since the unix epoch.
    pub created_at: i64,
    pub status: OrderStatus,
}

/// What the caller asks for; the ledger fills in the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub product_id: ProductId,
    pub quantity: i64,
}

impl NewOrder {
    pub fn new(product_id: impl Into<ProductId>, quantity: i64) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

fn order_index_key(user_id: &UserId) -> String {
    format!("orders:{user_id}")
}

fn order_key(user_id: &UserId, order_id: &OrderId) -> String {
    format!("orders:{user_id}:{order_id}")
}

/// Storage for order records, namespaced per user.
///
/// Each user has an index set of order IDs plus one JSON record per order.
#[derive(Clone)]
pub struct OrderLedger<S: KvStore> {
    store: S,
}

impl<S: KvStore> OrderLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Inserts a new order in status `preparing`.
    #[tracing::instrument(skip(self))]
    pub async fn insert(&self, user_id: &UserId, new_order: NewOrder) -> Result<Order, DomainError> {
        if new_order.quantity <= 0 {
            return Err(DomainError::InvalidQuantity(new_order.quantity));
        }

        let order = Order {
            id: OrderId::generate(),
            user_id: user_id.clone(),
            product_id: new_order.product_id,
            quantity: new_order.quantity,
            created_at: now_nanos(),
            status: OrderStatus::Preparing,
        };

        let key = order_key(user_id, &order.id);
        self.store
            .set_json(&key, &order, SetOptions::expect_new())
            .await?;

        if let Err(e) = self
            .store
            .set_add(&order_index_key(user_id), order.id.as_str())
            .await
        {
            // Without an index entry the record is unreachable; drop it.
            if let Err(cleanup) = self.store.delete(&key).await {
                tracing::warn!(%key, error = %cleanup, "failed to remove unindexed order record");
            }
            return Err(e.into());
        }

        Ok(order)
    }

    /// Fetches a single order.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, user_id: &UserId, order_id: &OrderId) -> Result<Order, DomainError> {
        self.store
            .get_json(&order_key(user_id, order_id))
            .await?
            .ok_or_else(|| DomainError::OrderNotFound {
                user_id: user_id.clone(),
                order_id: order_id.clone(),
            })
    }

    /// Lists a user's orders, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, user_id: &UserId) -> Result<Vec<Order>, DomainError> {
        let ids = self.store.set_members(&order_index_key(user_id)).await?;

        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            let order_id = OrderId::new(id);
            match self
                .store
                .get_json::<Order>(&order_key(user_id, &order_id))
                .await?
            {
                Some(order) => orders.push(order),
                None => {
                    tracing::warn!(%user_id, %order_id, "order indexed but record missing");
                }
            }
        }

        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(orders)
    }

    /// Deletes an order. Fails with `OrderNotFound` if it is not in the ledger.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, user_id: &UserId, order_id: &OrderId) -> Result<(), DomainError> {
        let removed = self
            .store
            .set_remove(&order_index_key(user_id), &[order_id.to_string()])
            .await?;
        if removed == 0 {
            return Err(DomainError::OrderNotFound {
                user_id: user_id.clone(),
                order_id: order_id.clone(),
            });
        }

        self.store.delete(&order_key(user_id, order_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_store::InMemoryKvStore;

    fn ledger() -> OrderLedger<InMemoryKvStore> {
        OrderLedger::new(InMemoryKvStore::new())
    }

    #[tokio::test]
    async fn insert_and_get() {
        let ledger = ledger();
        let user = UserId::new("u1");

        let order = ledger.insert(&user, NewOrder::new("P1", 2)).await.unwrap();
        assert_eq!(order.status, OrderStatus::Preparing);
        assert_eq!(order.user_id, user);
        assert!(order.created_at > 0);

        let loaded = ledger.get(&user, &order.id).await.unwrap();
        assert_eq!(loaded, order);
    }

    #[tokio::test]
    async fn insert_rejects_non_positive_quantity() {
        let ledger = ledger();
        let result = ledger.insert(&UserId::new("u1"), NewOrder::new("P1", 0)).await;
        assert!(matches!(result, Err(DomainError::InvalidQuantity(0))));
    }

    #[tokio::test]
    async fn orders_are_namespaced_per_user() {
        let ledger = ledger();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        let order = ledger.insert(&alice, NewOrder::new("P1", 1)).await.unwrap();

        assert!(matches!(
            ledger.get(&bob, &order.id).await,
            Err(DomainError::OrderNotFound { .. })
        ));
        assert!(ledger.list(&bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_returns_orders_oldest_first() {
        let ledger = ledger();
        let user = UserId::new("u1");

        let first = ledger.insert(&user, NewOrder::new("P1", 1)).await.unwrap();
        let second = ledger.insert(&user, NewOrder::new("P2", 3)).await.unwrap();

        let orders = ledger.list(&user).await.unwrap();
        let ids: Vec<_> = orders.iter().map(|o| o.id.clone()).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn delete_twice_is_not_found() {
        let ledger = ledger();
        let user = UserId::new("u1");
        let order = ledger.insert(&user, NewOrder::new("P1", 1)).await.unwrap();

        ledger.delete(&user, &order.id).await.unwrap();
        assert!(matches!(
            ledger.delete(&user, &order.id).await,
            Err(DomainError::OrderNotFound { .. })
        ));
        assert!(matches!(
            ledger.get(&user, &order.id).await,
            Err(DomainError::OrderNotFound { .. })
        ));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&OrderStatus::Arrived).unwrap();
        assert_eq!(json, "\"arrived\"");
    }
}
