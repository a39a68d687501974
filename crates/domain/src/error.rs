//! Domain error types.

use common::{OrderId, ProductId, UserId};
use kv_store::KvStoreError;
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Applying the change would drive a stock counter below zero.
    #[error(
        "Insufficient stock for product {product_id}: {available} available, {requested} requested"
    )]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    /// The product has no stock counter (or no catalog entry).
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The order is not in the user's ledger.
    #[error("Order {order_id} not found for user {user_id}")]
    OrderNotFound { user_id: UserId, order_id: OrderId },

    /// The user's cart has no line for the product.
    #[error("Cart of user {user_id} has no line for product {product_id}")]
    CartLineNotFound {
        user_id: UserId,
        product_id: ProductId,
    },

    /// Quantities on the wire must be strictly positive.
    #[error("Invalid quantity: {0}, must be greater than zero")]
    InvalidQuantity(i64),

    /// A paging cursor could not be parsed.
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// The optimistic write kept losing races until the retry budget ran out.
    #[error("Gave up on key {key} after {attempts} conflicting attempts")]
    ContentionExhausted { key: String, attempts: u32 },

    /// A stored counter is not an integer.
    #[error("Corrupt value at key {key}: {reason}")]
    CorruptValue { key: String, reason: String },

    /// An error occurred in the key-value store.
    #[error("Store error: {0}")]
    Store(#[from] KvStoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
