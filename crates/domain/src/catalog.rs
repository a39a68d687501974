//! The product catalog, listed newest first.

use common::{ProductId, now_nanos};
use kv_store::{KvStore, KvStoreExt, SetOptions};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Number of products returned per page.
pub const PAGE_SIZE: usize = 20;

const CATALOG_INDEX_KEY: &str = "products";

/// Creation attempts before giving up on finding a free product ID.
const CREATE_ATTEMPTS: u32 = 3;

fn product_key(product_id: &ProductId) -> String {
    format!("products:{product_id}")
}

/// Index score for a product. Scores travel through Redis as doubles, so
/// they are kept at microsecond resolution to stay exact. Products created in
/// the same microsecond share a score and are told apart by their IDs.
fn index_score(created_at: i64) -> i64 {
    created_at.div_euclid(1_000)
}

/// True if `member` shares the cursor's score and was created no later than
/// the cursor, i.e. it was already on an earlier page.
fn listed_before(cursor: i64, member: &str, score: i64) -> bool {
    score == index_score(cursor) && member.parse::<i64>().is_ok_and(|created| created >= cursor)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Creation time in nanoseconds since the unix epoch.
    pub created_at: i64,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub category: String,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
        }
    }
}

/// One page of the catalog listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    /// Cursor for the next page: the creation time of the last product
    /// returned, or empty when the page is empty.
    pub next_key: String,
}

/// Product records plus a creation-time index.
#[derive(Clone)]
pub struct Catalog<S: KvStore> {
    store: S,
}

impl<S: KvStore> Catalog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a product. Its ID is its creation time in nanoseconds.
    #[tracing::instrument(skip(self))]
    pub async fn create(&self, new_product: NewProduct) -> Result<Product, DomainError> {
        let mut attempt = 0;
        let product = loop {
            attempt += 1;
            let created_at = now_nanos();
            let product = Product {
                id: ProductId::new(created_at.to_string()),
                name: new_product.name.clone(),
                created_at,
                category: new_product.category.clone(),
            };

            match self
                .store
                .set_json(&product_key(&product.id), &product, SetOptions::expect_new())
                .await
            {
                Ok(_) => break product,
                // Another product was created in the same nanosecond.
                Err(e) if e.is_conflict() && attempt < CREATE_ATTEMPTS => continue,
                Err(e) => return Err(e.into()),
            }
        };

        if let Err(e) = self
            .store
            .sorted_add(
                CATALOG_INDEX_KEY,
                index_score(product.created_at),
                product.id.as_str(),
            )
            .await
        {
            let key = product_key(&product.id);
            if let Err(cleanup) = self.store.delete(&key).await {
                tracing::warn!(%key, error = %cleanup, "failed to remove unindexed product");
            }
            return Err(e.into());
        }

        metrics::counter!("products_created_total").increment(1);
        Ok(product)
    }

    /// Lists up to `limit` products, newest first.
    ///
    /// `from` is the `next_key` of the previous page; only older products
    /// are returned.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, from: Option<&str>, limit: usize) -> Result<ProductPage, DomainError> {
        let cursor = match from.filter(|s| !s.is_empty()) {
            Some(raw) => Some(
                raw.parse::<i64>()
                    .map_err(|_| DomainError::InvalidCursor(raw.to_string()))?,
            ),
            None => None,
        };

        // The range includes the cursor's score, so products sharing it that
        // were already listed come first and are skipped.
        let mut fetch = limit;
        let members = loop {
            let range = self
                .store
                .sorted_range_desc(CATALOG_INDEX_KEY, cursor.map(index_score), fetch)
                .await?;
            let fetched = range.len();
            let fresh: Vec<String> = range
                .into_iter()
                .filter(|(member, score)| {
                    !cursor.is_some_and(|c| listed_before(c, member, *score))
                })
                .map(|(member, _)| member)
                .collect();
            let skipped = fetched - fresh.len();
            if fresh.len() >= limit || fetched < fetch {
                break fresh;
            }
            fetch = limit + skipped;
        };

        let mut products = Vec::with_capacity(members.len().min(limit));
        for member in members.into_iter().take(limit) {
            let product_id = ProductId::new(member);
            match self.store.get_json::<Product>(&product_key(&product_id)).await? {
                Some(product) => products.push(product),
                None => tracing::warn!(%product_id, "product indexed but record missing"),
            }
        }

        let next_key = products
            .last()
            .map(|p| p.created_at.to_string())
            .unwrap_or_default();
        Ok(ProductPage { products, next_key })
    }

    /// Deletes a product. Fails with `ProductNotFound` if it does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, product_id: &ProductId) -> Result<(), DomainError> {
        if !self.store.delete(&product_key(product_id)).await? {
            return Err(DomainError::ProductNotFound(product_id.clone()));
        }
        if !self
            .store
            .sorted_remove(CATALOG_INDEX_KEY, product_id.as_str())
            .await?
        {
            tracing::warn!(%product_id, "deleted product was missing from the index");
        }
        Ok(())
    }
}
