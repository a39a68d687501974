//! Request and response bodies exchanged between the services.

use serde::{Deserialize, Serialize};

use crate::{OrderId, ProductId};

/// Body of the stock `drop` and `put` endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityPayload {
    pub quantity: i64,
}

/// Response of the stock query endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockInfo {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Body of the order placement endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Response of a successful order placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedResponse {
    pub order_id: OrderId,
}

/// A single line in a user's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Body of the product creation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub category: String,
}
