//! Identifiers and wire types shared by the cart, order, product and stock services.

pub mod types;
pub mod wire;

pub use types::{OrderId, ProductId, UserId, now_nanos};
pub use wire::{
    CartLine, CreateProductRequest, OrderCreatedResponse, PlaceOrderRequest, QuantityPayload,
    StockInfo,
};
