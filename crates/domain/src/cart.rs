//! Per-user shopping carts.

use common::{CartLine, ProductId, UserId};
use kv_store::KvStore;

use crate::error::DomainError;
use crate::optimistic::{RetryPolicy, commit_counter, parse_counter, update_counter};

fn cart_index_key(user_id: &UserId) -> String {
    format!("cart:{user_id}")
}

fn cart_line_key(user_id: &UserId, product_id: &ProductId) -> String {
    format!("cart:{user_id}:{product_id}")
}

/// Cart lines keyed by user and product.
///
/// A line is a quantity counter plus an entry in the user's cart index. Lines
/// whose quantity drops to zero are removed.
#[derive(Clone)]
pub struct CartStore<S: KvStore> {
    store: S,
    retry: RetryPolicy,
}

impl<S: KvStore> CartStore<S> {
    pub fn new(store: S) -> Self {
        Self::with_retry_policy(store, RetryPolicy::default())
    }

    pub fn with_retry_policy(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Lists the lines of a user's cart. An empty cart yields an empty list.
    #[tracing::instrument(skip(self))]
    pub async fn lines(&self, user_id: &UserId) -> Result<Vec<CartLine>, DomainError> {
        let members = self.store.set_members(&cart_index_key(user_id)).await?;

        let mut lines = Vec::with_capacity(members.len());
        for member in members {
            let product_id = ProductId::new(member);
            let key = cart_line_key(user_id, &product_id);
            match self.store.get(&key).await? {
                Some(entry) => {
                    let quantity = parse_counter(&key, &entry.value)?;
                    // Emptied by a removal that has not deleted it yet.
                    if quantity > 0 {
                        lines.push(CartLine {
                            quantity,
                            product_id,
                        });
                    }
                }
                None => tracing::warn!(%user_id, %product_id, "cart line indexed but missing"),
            }
        }
        Ok(lines)
    }

    /// Adds `quantity` units of a product to the cart. Returns the line's new quantity.
    #[tracing::instrument(skip(self))]
    pub async fn add(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<i64, DomainError> {
        if quantity <= 0 {
            return Err(DomainError::InvalidQuantity(quantity));
        }

        let key = cart_line_key(user_id, product_id);
        let total = update_counter(&self.store, &key, &self.retry, |current| {
            current
                .unwrap_or(0)
                .checked_add(quantity)
                .ok_or(DomainError::InvalidQuantity(quantity))
        })
        .await?;

        self.store
            .set_add(&cart_index_key(user_id), product_id.as_str())
            .await?;
        Ok(total)
    }

    /// Takes `quantity` units of a product out of the cart.
    ///
    /// Returns the remaining quantity; zero means the line was removed.
    #[tracing::instrument(skip(self))]
    pub async fn remove(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<i64, DomainError> {
        if quantity <= 0 {
            return Err(DomainError::InvalidQuantity(quantity));
        }

        let key = cart_line_key(user_id, product_id);
        let (remaining, version) = commit_counter(&self.store, &key, &self.retry, |current| {
            let current = current.ok_or_else(|| DomainError::CartLineNotFound {
                user_id: user_id.clone(),
                product_id: product_id.clone(),
            })?;
            Ok(current.saturating_sub(quantity).max(0))
        })
        .await?;
        if remaining > 0 {
            return Ok(remaining);
        }

        // Only the emptied line is deleted; a line refilled since then stays.
        match self.store.delete_at(&key, version).await {
            Ok(_) => {}
            Err(e) if e.is_conflict() => {
                tracing::debug!(%user_id, %product_id, "emptied cart line was refilled");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        }

        let index_key = cart_index_key(user_id);
        self.store
            .set_remove(&index_key, &[product_id.to_string()])
            .await?;
        // An add that recreated the line in between may have been unindexed above.
        if self.store.get(&key).await?.is_some() {
            self.store.set_add(&index_key, product_id.as_str()).await?;
        }
        Ok(0)
    }

    /// Removes the given products' lines from the cart.
    #[tracing::instrument(skip(self))]
    pub async fn clear(
        &self,
        user_id: &UserId,
        product_ids: &[ProductId],
    ) -> Result<(), DomainError> {
        if product_ids.is_empty() {
            return Ok(());
        }

        let members: Vec<String> = product_ids.iter().map(ToString::to_string).collect();
        self.store
            .set_remove(&cart_index_key(user_id), &members)
            .await?;
        for product_id in product_ids {
            self.store
                .delete(&cart_line_key(user_id, product_id))
                .await?;
        }
        Ok(())
    }
}
