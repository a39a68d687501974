//! Sagas spanning the cart, orders and stock services.
//!
//! No transaction spans the services, so multi-step operations are run as
//! sagas with compensating actions:
//! - [`OrderPlacement`]: inserts an order and deducts its stock, deleting the
//!   order again if the deduction fails. Cancellation deletes and restocks.
//! - [`Checkout`]: places one order per cart line and clears the cart once
//!   every line was ordered.
//!
//! Compensations that fail are reported through [`Inconsistency`].

pub mod checkout;
pub mod error;
pub mod inconsistency;
pub mod placement;
pub mod services;
pub mod state;

pub use checkout::Checkout;
pub use error::{ErrorKind, SagaError};
pub use inconsistency::Inconsistency;
pub use placement::OrderPlacement;
pub use services::{
    HttpOrdersService, HttpStockService, InjectedFailure, LocalOrdersService, LocalStockService,
    OrdersService, StockService, base_url, http_client,
};
pub use state::PlacementState;
