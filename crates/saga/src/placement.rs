//! Order placement and cancellation.
//!
//! Placing an order writes to two places owned by different services: the
//! order ledger (local) and the stock counter (remote). There is no
//! transaction spanning both, so placement is a small saga:
//!
//! 1. Validate the requested quantity against the current stock level.
//! 2. Insert the order record.
//! 3. Ask the stock service to deduct the units.
//!
//! If step 3 fails the order record is deleted again, so an order exists
//! exactly when its stock was deducted. A failed deletion cannot be repaired
//! here and is reported as an [`Inconsistency`].

use std::sync::Arc;
use std::time::Instant;

use common::{OrderId, ProductId, UserId};
use domain::{DomainError, NewOrder, Order, OrderLedger};
use kv_store::KvStore;

use crate::error::{ErrorKind, Result, SagaError};
use crate::inconsistency::Inconsistency;
use crate::services::StockService;
use crate::state::PlacementState;

/// Drives order placement and cancellation against a ledger and a stock service.
pub struct OrderPlacement<S: KvStore, St: StockService> {
    ledger: OrderLedger<S>,
    stock: Arc<St>,
}

impl<S: KvStore + Clone, St: StockService> Clone for OrderPlacement<S, St> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            stock: Arc::clone(&self.stock),
        }
    }
}

fn advance(state: &mut PlacementState, next: PlacementState) {
    debug_assert!(
        state.can_advance_to(next),
        "illegal placement transition {state} -> {next}"
    );
    tracing::debug!(from = %state, to = %next, "placement state changed");
    *state = next;
    tracing::Span::current().record("state", next.as_str());
}

fn order_error(e: DomainError) -> SagaError {
    match e {
        DomainError::OrderNotFound { user_id, order_id } => {
            SagaError::OrderNotFound { user_id, order_id }
        }
        other => SagaError::Domain(other),
    }
}

impl<S: KvStore, St: StockService> OrderPlacement<S, St> {
    pub fn new(ledger: OrderLedger<S>, stock: St) -> Self {
        Self {
            ledger,
            stock: Arc::new(stock),
        }
    }

    pub fn ledger(&self) -> &OrderLedger<S> {
        &self.ledger
    }

    pub fn stock(&self) -> &St {
        &self.stock
    }

    /// Places an order for `quantity` units of a product.
    ///
    /// Fails with `UnknownProduct` if the stock service does not know the
    /// product and with `InsufficientStock` if there are not enough units,
    /// either at validation time or because a concurrent order took them
    /// before the deduction.
    #[tracing::instrument(skip(self), fields(state = tracing::field::Empty))]
    pub async fn place(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<Order> {
        let started = Instant::now();
        let mut state = PlacementState::Validating;

        if quantity <= 0 {
            advance(&mut state, PlacementState::Rejected);
            return Err(SagaError::InvalidQuantity(quantity));
        }

        let available = match self.stock.query(product_id).await {
            Ok(available) => available,
            Err(SagaError::ProductNotFound(_)) => {
                advance(&mut state, PlacementState::Rejected);
                return Err(SagaError::UnknownProduct(product_id.clone()));
            }
            Err(e) => {
                advance(&mut state, PlacementState::Rejected);
                tracing::error!(%product_id, error = %e, "failed to query stock");
                return Err(e);
            }
        };

        if available < quantity {
            advance(&mut state, PlacementState::Rejected);
            metrics::counter!("orders_rejected_total", "reason" => "insufficient_stock")
                .increment(1);
            return Err(SagaError::InsufficientStock {
                product_id: product_id.clone(),
                requested: quantity,
            });
        }

        let order = match self
            .ledger
            .insert(user_id, NewOrder::new(product_id.clone(), quantity))
            .await
        {
            Ok(order) => order,
            Err(e) => {
                advance(&mut state, PlacementState::Rejected);
                tracing::error!(%user_id, %product_id, error = %e, "failed to insert order");
                return Err(e.into());
            }
        };
        advance(&mut state, PlacementState::Reserved);

        advance(&mut state, PlacementState::Committing);
        let failure = match self.stock.drop_stock(product_id, quantity).await {
            Ok(()) => {
                advance(&mut state, PlacementState::Committed);
                metrics::counter!("orders_placed_total").increment(1);
                metrics::histogram!("order_placement_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(order_id = %order.id, "order placed");
                return Ok(order);
            }
            Err(e) => e,
        };

        advance(&mut state, PlacementState::Compensating);
        tracing::warn!(order_id = %order.id, error = %failure, "stock deduction failed, removing order");

        match self.ledger.delete(user_id, &order.id).await {
            Ok(()) | Err(DomainError::OrderNotFound { .. }) => {
                advance(&mut state, PlacementState::Compensated);
                metrics::counter!("orders_compensated_total").increment(1);
                Err(match failure {
                    e @ SagaError::InsufficientStock { .. } => e,
                    e if e.kind() == ErrorKind::ServiceInternal => e,
                    other => SagaError::StockService(other.to_string()),
                })
            }
            Err(delete_error) => {
                advance(&mut state, PlacementState::Failed);
                Inconsistency::OrphanedOrder {
                    user_id: user_id.clone(),
                    order_id: order.id.clone(),
                    product_id: product_id.clone(),
                    quantity,
                    reason: format!("{failure}; delete failed: {delete_error}"),
                }
                .report();
                Err(SagaError::CompensationFailed {
                    step: "delete_order".to_string(),
                    reason: delete_error.to_string(),
                })
            }
        }
    }

    /// Cancels an order and returns its units to stock.
    ///
    /// The order is deleted first. If the restock then fails the deletion
    /// stands and the lost restock is reported; the call still succeeds.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, user_id: &UserId, order_id: &OrderId) -> Result<Order> {
        let order = self.ledger.get(user_id, order_id).await.map_err(order_error)?;
        self.ledger
            .delete(user_id, order_id)
            .await
            .map_err(order_error)?;

        match self.stock.put_stock(&order.product_id, order.quantity).await {
            Ok(()) => {
                metrics::counter!("orders_cancelled_total").increment(1);
                tracing::info!(%order_id, "order cancelled");
            }
            Err(e) => Inconsistency::LostRestock {
                user_id: user_id.clone(),
                order_id: order_id.clone(),
                product_id: order.product_id.clone(),
                quantity: order.quantity,
                reason: e.to_string(),
            }
            .report(),
        }

        Ok(order)
    }

    /// Lists a user's orders, oldest first.
    pub async fn list(&self, user_id: &UserId) -> Result<Vec<Order>> {
        Ok(self.ledger.list(user_id).await?)
    }
}
