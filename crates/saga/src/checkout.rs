//! Turning a whole cart into orders.

use common::{OrderId, ProductId, UserId};
use domain::CartStore;
use kv_store::KvStore;

use crate::error::{Result, SagaError};
use crate::inconsistency::Inconsistency;
use crate::services::OrdersService;

/// Places one order per cart line, in cart order.
///
/// The first failing line aborts the checkout. Orders already placed for
/// earlier lines are kept (their stock stays deducted) and the cart is left
/// as it was. Only when every line was ordered are the lines removed.
pub struct Checkout<S: KvStore, O: OrdersService> {
    cart: CartStore<S>,
    orders: O,
}

impl<S: KvStore, O: OrdersService> Checkout<S, O> {
    pub fn new(cart: CartStore<S>, orders: O) -> Self {
        Self { cart, orders }
    }

    pub fn cart(&self) -> &CartStore<S> {
        &self.cart
    }

    /// Orders every line of the user's cart and returns the order IDs in cart order.
    ///
    /// Fails with `EmptyCart` for a cart without lines and otherwise with the
    /// error of the first line that could not be ordered. Both `EmptyCart` and
    /// `InsufficientStock` are rejections of the request, so over HTTP both
    /// surface as 406; callers tell them apart by the error message.
    #[tracing::instrument(skip(self))]
    pub async fn checkout(&self, user_id: &UserId) -> Result<Vec<OrderId>> {
        let lines = self.cart.lines(user_id).await?;
        if lines.is_empty() {
            metrics::counter!("checkout_total", "outcome" => "empty").increment(1);
            return Err(SagaError::EmptyCart(user_id.clone()));
        }

        let mut order_ids = Vec::with_capacity(lines.len());
        for line in &lines {
            match self
                .orders
                .place(user_id, &line.product_id, line.quantity)
                .await
            {
                Ok(order_id) => order_ids.push(order_id),
                Err(e) => {
                    metrics::counter!("checkout_total", "outcome" => "failed").increment(1);
                    tracing::warn!(
                        product_id = %line.product_id,
                        placed = order_ids.len(),
                        error = %e,
                        "checkout aborted"
                    );
                    return Err(match e {
                        // The product existed when it was put in the cart.
                        SagaError::UnknownProduct(product_id) => {
                            SagaError::ProductNotFound(product_id)
                        }
                        other => other,
                    });
                }
            }
        }

        let products: Vec<ProductId> = lines.into_iter().map(|line| line.product_id).collect();
        if let Err(e) = self.cart.clear(user_id, &products).await {
            Inconsistency::StaleCart {
                user_id: user_id.clone(),
                product_ids: products,
                reason: e.to_string(),
            }
            .report();
        }

        metrics::counter!("checkout_total", "outcome" => "completed").increment(1);
        Ok(order_ids)
    }
}
