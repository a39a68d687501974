//! Reporting of state the sagas could not repair on their own.
//!
//! These are emitted on the `critical` tracing target and counted in
//! `saga_inconsistencies_total`, so they can be alerted on separately from
//! ordinary request errors. Every report needs manual reconciliation.

use common::{OrderId, ProductId, UserId};

/// A known divergence between the order ledger, the stock counters and carts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    /// An order record exists whose stock deduction never happened.
    OrphanedOrder {
        user_id: UserId,
        order_id: OrderId,
        product_id: ProductId,
        quantity: i64,
        reason: String,
    },

    /// A cancelled order's units were never returned to stock.
    LostRestock {
        user_id: UserId,
        order_id: OrderId,
        product_id: ProductId,
        quantity: i64,
        reason: String,
    },

    /// Cart lines that were ordered could not be removed from the cart.
    StaleCart {
        user_id: UserId,
        product_ids: Vec<ProductId>,
        reason: String,
    },
}

impl Inconsistency {
    pub fn kind(&self) -> &'static str {
        match self {
            Inconsistency::OrphanedOrder { .. } => "orphaned_order",
            Inconsistency::LostRestock { .. } => "lost_restock",
            Inconsistency::StaleCart { .. } => "stale_cart",
        }
    }

    /// Logs the inconsistency at critical severity and counts it.
    pub fn report(&self) {
        metrics::counter!("saga_inconsistencies_total", "kind" => self.kind()).increment(1);

        match self {
            Inconsistency::OrphanedOrder {
                user_id,
                order_id,
                product_id,
                quantity,
                reason,
            } => tracing::error!(
                target: "critical",
                kind = self.kind(),
                %user_id,
                %order_id,
                %product_id,
                quantity,
                reason = %reason,
                "order record left without a stock deduction"
            ),
            Inconsistency::LostRestock {
                user_id,
                order_id,
                product_id,
                quantity,
                reason,
            } => tracing::error!(
                target: "critical",
                kind = self.kind(),
                %user_id,
                %order_id,
                %product_id,
                quantity,
                reason = %reason,
                "cancelled order was not returned to stock"
            ),
            Inconsistency::StaleCart {
                user_id,
                product_ids,
                reason,
            } => tracing::error!(
                target: "critical",
                kind = self.kind(),
                %user_id,
                products = ?product_ids,
                reason = %reason,
                "ordered cart lines were not removed"
            ),
        }
    }
}
