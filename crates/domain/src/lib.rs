//! Domain layer for the shop services.
//!
//! This crate provides the state each service owns in the key-value store:
//! - Inventory: per-product stock counters guarded by optimistic concurrency
//! - OrderLedger: per-user order records
//! - CartStore: per-user cart lines
//! - Catalog: the product list, newest first

pub mod cart;
pub mod catalog;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod optimistic;

pub use cart::CartStore;
pub use catalog::{Catalog, NewProduct, PAGE_SIZE, Product, ProductPage};
pub use error::DomainError;
pub use inventory::Inventory;
pub use ledger::{NewOrder, Order, OrderLedger, OrderStatus};
pub use optimistic::{RetryPolicy, update_counter};
