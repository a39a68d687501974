//! Saga error types.

use common::{OrderId, ProductId, UserId};
use domain::DomainError;
use thiserror::Error;

/// Errors that can occur while placing, cancelling or checking out orders.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The stock service does not know the product.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// An order was requested for a product that has no stock counter.
    #[error("Unknown product: {0}")]
    UnknownProduct(ProductId),

    /// Not enough units to satisfy the request.
    #[error("Insufficient stock for product {product_id}: {requested} requested")]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
    },

    /// The order is not in the user's ledger.
    #[error("Order {order_id} not found for user {user_id}")]
    OrderNotFound { user_id: UserId, order_id: OrderId },

    /// Checkout was requested for a cart without lines.
    #[error("Cart of user {0} is empty")]
    EmptyCart(UserId),

    /// Quantities must be strictly positive.
    #[error("Invalid quantity: {0}, must be greater than zero")]
    InvalidQuantity(i64),

    /// The stock service failed or could not be reached.
    #[error("Stock service error: {0}")]
    StockService(String),

    /// The orders service failed or could not be reached.
    #[error("Orders service error: {0}")]
    OrdersService(String),

    /// A compensating step failed and left state that needs manual repair.
    #[error("Compensation step '{step}' failed: {reason}")]
    CompensationFailed { step: String, reason: String },

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

/// How an error is reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InsufficientStock,
    EmptyCart,
    BadRequest,
    ServiceInternal,
}

impl SagaError {
    /// Classifies the error for the HTTP layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SagaError::ProductNotFound(_) | SagaError::OrderNotFound { .. } => ErrorKind::NotFound,
            SagaError::UnknownProduct(_) | SagaError::InvalidQuantity(_) => ErrorKind::BadRequest,
            SagaError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            SagaError::EmptyCart(_) => ErrorKind::EmptyCart,
            SagaError::StockService(_)
            | SagaError::OrdersService(_)
            | SagaError::CompensationFailed { .. } => ErrorKind::ServiceInternal,
            SagaError::Domain(e) => match e {
                DomainError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
                DomainError::ProductNotFound(_)
                | DomainError::OrderNotFound { .. }
                | DomainError::CartLineNotFound { .. } => ErrorKind::NotFound,
                DomainError::InvalidQuantity(_) | DomainError::InvalidCursor(_) => {
                    ErrorKind::BadRequest
                }
                DomainError::ContentionExhausted { .. }
                | DomainError::CorruptValue { .. }
                | DomainError::Store(_)
                | DomainError::Serialization(_) => ErrorKind::ServiceInternal,
            },
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
