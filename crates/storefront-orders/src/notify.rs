//! # Notifications
//!
//! Email, invoice PDF and similar side effects after an order exists.
//! They run on a spawned task; a failure is logged and never reaches the
//! caller of `place_order`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use storefront_core::{Discount, Order, OrderLine};

use crate::error::NotifyError;

#[async_trait]
pub trait OrderNotifier: Send + Sync {
    async fn order_placed(&self, order: &Order, lines: &[OrderLine]) -> Result<(), NotifyError>;

    async fn discount_applied(&self, discount: &Discount, book_ids: &[i64]) -> Result<(), NotifyError>;
}

/// Default notifier. Writes a log line and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl OrderNotifier for LogNotifier {
    async fn order_placed(&self, order: &Order, lines: &[OrderLine]) -> Result<(), NotifyError> {
        info!(
            order_id = order.id,
            user_id = order.user_id,
            lines = lines.len(),
            total = %order.total_price(),
            "Order confirmation"
        );
        Ok(())
    }

    async fn discount_applied(&self, discount: &Discount, book_ids: &[i64]) -> Result<(), NotifyError> {
        info!(
            discount_id = discount.id,
            rate_bps = discount.rate_bps,
            books = book_ids.len(),
            "Discount announcement"
        );
        Ok(())
    }
}

/// Fire-and-forget `order_placed`.
pub fn spawn_order_placed(notifier: Arc<dyn OrderNotifier>, order: Order, lines: Vec<OrderLine>) {
    tokio::spawn(async move {
        if let Err(e) = notifier.order_placed(&order, &lines).await {
            warn!(order_id = order.id, error = %e, "Order notification failed");
        }
    });
}

/// Fire-and-forget `discount_applied`.
pub fn spawn_discount_applied(notifier: Arc<dyn OrderNotifier>, discount: Discount, book_ids: Vec<i64>) {
    tokio::spawn(async move {
        if let Err(e) = notifier.discount_applied(&discount, &book_ids).await {
            warn!(discount_id = discount.id, error = %e, "Discount notification failed");
        }
    });
}
