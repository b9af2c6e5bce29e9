//! # Order Placement
//!
//! Turns a cart into an order as a saga of local writes.
//!
//! ## Saga Steps
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. VALIDATE        read books, compare stock            no writes      │
//! │       │ any short → InsufficientStock(all lines)         clean          │
//! │       ▼                                                                 │
//! │  2+3. CREATE        orders + order_lines, status pending  one tx        │
//! │       │             prices resolved once, frozen on lines               │
//! │       ▼                                                                 │
//! │  4. DECREMENT       conditional UPDATE per line, every line attempted   │
//! │       │ any refused → compensate                                        │
//! │       ▼                                                                 │
//! │  5. DELIVERY        delivery_statuses row 'processing'                  │
//! │       │ failed → compensate                                             │
//! │       ▼                                                                 │
//! │     CLEAR CART      consumed lines removed (failure only logged)        │
//! │       ▼                                                                 │
//! │     COMMIT          status committed                                    │
//! │       ▼                                                                 │
//! │     NOTIFY          spawned, fire-and-forget                            │
//! │                                                                         │
//! │  COMPENSATE: restore every line whose stock_decremented flag is set,    │
//! │              then status failed. Logged at error level with order id,   │
//! │              step and books.                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Recovery
//! A crash between steps leaves a `pending` order. The worker calls
//! [`CheckoutService::recover_incomplete_orders`]: orders that already have
//! a delivery row are rolled forward to `committed`, the rest are
//! compensated.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use ts_rs::TS;

use storefront_core::cart::normalize_lines;
use storefront_core::discount::resolve_rate;
use storefront_core::money::Money;
use storefront_core::pricing::{OrderQuote, PricedLine};
use storefront_core::validation::{validate_cart_size, validate_id, validate_quantity};
use storefront_core::{CartLine, CartOwner, DeliveryStatus, Order, OrderLine, StockShortfall};
use storefront_db::{Database, StockUpdate};

use crate::cart::Carts;
use crate::error::{CheckoutError, SagaFailure, SagaStep, ServiceError, ServiceResult};
use crate::notify::{spawn_order_placed, OrderNotifier};
use crate::stock::StockLedger;

// =============================================================================
// Results
// =============================================================================

/// A committed order.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct PlacedOrder {
    pub order: Order,
    pub lines: Vec<OrderLine>,
    pub delivery: DeliveryStatus,
    /// False if the consumed lines could not be removed from the cart.
    pub cart_cleared: bool,
}

/// An order with everything attached to it.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct OrderDetails {
    pub order: Order,
    pub lines: Vec<OrderLine>,
    pub delivery: Option<DeliveryStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub rolled_forward: Vec<i64>,
    pub compensated: Vec<i64>,
    /// Orders whose compensation failed again. Still `pending`.
    pub unresolved: Vec<i64>,
}

// =============================================================================
// Checkout Service
// =============================================================================

#[derive(Clone)]
pub struct CheckoutService {
    db: Database,
    carts: Carts,
    stock: StockLedger,
    notifier: Arc<dyn OrderNotifier>,
    shipping: Money,
}

impl CheckoutService {
    pub fn new(db: Database, carts: Carts, notifier: Arc<dyn OrderNotifier>, shipping: Money) -> Self {
        CheckoutService {
            stock: StockLedger::new(db.clone()),
            db,
            carts,
            notifier,
            shipping,
        }
    }

    /// Places an order for the account's current cart.
    pub async fn place_order(&self, user_id: i64, address_id: i64) -> Result<PlacedOrder, CheckoutError> {
        let lines = self.carts.get(CartOwner::Account(user_id)).await?;
        self.place_order_with(user_id, address_id, lines, Utc::now()).await
    }

    /// Places an order for explicit lines, pricing them at `at`.
    pub async fn place_order_with(
        &self,
        user_id: i64,
        address_id: i64,
        lines: Vec<CartLine>,
        at: DateTime<Utc>,
    ) -> Result<PlacedOrder, CheckoutError> {
        // ---------------------------------------------------------------------
        // 1. Validate
        // ---------------------------------------------------------------------
        validate_id("user_id", user_id)?;
        validate_id("address_id", address_id)?;

        let lines = normalize_lines(lines)?;
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        validate_cart_size(lines.len())?;
        for line in &lines {
            validate_quantity(line.quantity)?;
        }

        let mut priced = Vec::with_capacity(lines.len());
        let mut shortfalls = Vec::new();

        for line in &lines {
            let book = self
                .db
                .books()
                .get_by_id(line.book_id)
                .await?
                .ok_or(CheckoutError::BookNotFound(line.book_id))?;

            if !book.can_fulfil(line.quantity) {
                shortfalls.push(StockShortfall {
                    book_id: book.id,
                    requested: line.quantity,
                    available: book.available_quantity,
                });
                continue;
            }

            let discounts = self.db.discounts().for_book(book.id).await?;
            let rate = resolve_rate(&discounts, at);
            priced.push(PricedLine::new(book.id, line.quantity, book.price(), rate));
        }

        if !shortfalls.is_empty() {
            info!(user_id, short = shortfalls.len(), "Order rejected: insufficient stock");
            return Err(CheckoutError::InsufficientStock(shortfalls));
        }

        // ---------------------------------------------------------------------
        // 2+3. Create order and lines
        // ---------------------------------------------------------------------
        let quote = OrderQuote::new(priced, self.shipping);
        let (order, order_lines) = self
            .db
            .orders()
            .create_pending(user_id, address_id, at, &quote)
            .await?;

        info!(order_id = order.id, user_id, total = %quote.total, "Order created");

        // ---------------------------------------------------------------------
        // 4. Decrement stock, every line attempted
        // ---------------------------------------------------------------------
        let mut shortfalls = Vec::new();
        let mut errored = Vec::new();

        for line in &order_lines {
            match self.stock.decrement_line(line).await {
                Ok(StockUpdate::Applied) | Ok(StockUpdate::AlreadyApplied) => {}
                Ok(StockUpdate::Insufficient { available }) => shortfalls.push(StockShortfall {
                    book_id: line.book_id,
                    requested: line.quantity,
                    available,
                }),
                Err(e) => {
                    warn!(order_id = order.id, book_id = line.book_id, error = %e, "Decrement failed");
                    errored.push(line.book_id);
                }
            }
        }

        if !shortfalls.is_empty() || !errored.is_empty() {
            let mut affected: Vec<i64> = shortfalls.iter().map(|s| s.book_id).collect();
            affected.extend(errored);
            let reason = if shortfalls.is_empty() {
                "stock update failed".to_string()
            } else {
                "stock changed since validation".to_string()
            };
            return Err(self
                .fail(&order, &order_lines, SagaStep::DecrementStock, affected, shortfalls, reason)
                .await);
        }

        // ---------------------------------------------------------------------
        // 5. Open delivery
        // ---------------------------------------------------------------------
        let delivery = match self.db.deliveries().open(order.id).await {
            Ok(delivery) => delivery,
            Err(e) => {
                let affected = order_lines.iter().map(|l| l.book_id).collect();
                return Err(self
                    .fail(&order, &order_lines, SagaStep::OpenDelivery, affected, vec![], e.to_string())
                    .await);
            }
        };

        let cart_cleared = self.clear_consumed(user_id, &order_lines).await;

        // ---------------------------------------------------------------------
        // Commit
        // ---------------------------------------------------------------------
        match self.db.orders().mark_committed(order.id).await {
            Ok(true) => {}
            outcome => {
                // Delivery exists, so recovery rolls this order forward
                let reason = match outcome {
                    Err(e) => e.to_string(),
                    _ => "order was no longer pending".to_string(),
                };
                let failure = SagaFailure {
                    order_id: order.id,
                    step: SagaStep::Commit,
                    affected_books: vec![],
                    shortfalls: vec![],
                    compensated: false,
                    reason,
                };
                error!(order_id = order.id, step = %failure.step, reason = %failure.reason, "Order saga failed, left for recovery");
                return Err(CheckoutError::SagaFailed(failure));
            }
        }

        let order = self.db.orders().require(order.id).await.unwrap_or(order);

        info!(order_id = order.id, lines = order_lines.len(), "Order committed");

        spawn_order_placed(self.notifier.clone(), order.clone(), order_lines.clone());

        Ok(PlacedOrder {
            order,
            lines: order_lines,
            delivery,
            cart_cleared,
        })
    }

    /// Removes the ordered books from the account cart. Best effort.
    async fn clear_consumed(&self, user_id: i64, lines: &[OrderLine]) -> bool {
        let owner = CartOwner::Account(user_id);
        let mut cleared = true;

        for line in lines {
            if let Err(e) = self.carts.remove(owner, line.book_id).await {
                warn!(user_id, book_id = line.book_id, error = %e, "Could not remove ordered line from cart");
                cleared = false;
            }
        }

        cleared
    }

    /// Compensates and builds the failure report.
    async fn fail(
        &self,
        order: &Order,
        lines: &[OrderLine],
        step: SagaStep,
        affected_books: Vec<i64>,
        shortfalls: Vec<StockShortfall>,
        reason: String,
    ) -> CheckoutError {
        let compensated = self.compensate(order.id, lines, &reason).await;

        error!(
            order_id = order.id,
            %step,
            books = ?affected_books,
            compensated,
            reason = %reason,
            "Order saga failed"
        );

        CheckoutError::SagaFailed(SagaFailure {
            order_id: order.id,
            step,
            affected_books,
            shortfalls,
            compensated,
            reason,
        })
    }

    /// Restores every decremented line, then marks the order failed.
    /// True if all of it succeeded.
    async fn compensate(&self, order_id: i64, lines: &[OrderLine], reason: &str) -> bool {
        let mut ok = true;

        for line in lines {
            if let Err(e) = self.stock.restore_line(line).await {
                error!(order_id, book_id = line.book_id, error = %e, "Compensation restore failed");
                ok = false;
            }
        }

        if !ok {
            return false;
        }

        match self.db.orders().mark_failed(order_id, reason).await {
            Ok(_) => true,
            Err(e) => {
                error!(order_id, error = %e, "Could not mark order failed");
                false
            }
        }
    }

    // =========================================================================
    // Recovery
    // =========================================================================

    /// Settles `pending` orders last touched more than `older_than` ago.
    pub async fn recover_incomplete_orders(&self, older_than: Duration) -> ServiceResult<RecoveryReport> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::zero());
        let mut report = RecoveryReport::default();

        for order in self.db.orders().pending().await? {
            if order.updated_at > cutoff {
                continue;
            }

            if self.db.deliveries().get(order.id).await?.is_some() {
                self.db.orders().mark_committed(order.id).await?;
                info!(order_id = order.id, "Interrupted order rolled forward");
                report.rolled_forward.push(order.id);
                continue;
            }

            let lines = self.db.orders().lines(order.id).await?;
            if self.compensate(order.id, &lines, "interrupted before delivery was opened").await {
                warn!(order_id = order.id, "Interrupted order compensated");
                report.compensated.push(order.id);
            } else {
                report.unresolved.push(order.id);
            }
        }

        Ok(report)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn order_details(&self, order_id: i64) -> ServiceResult<OrderDetails> {
        let order = self
            .db
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
        let lines = self.db.orders().lines(order_id).await?;
        let delivery = self.db.deliveries().get(order_id).await?;

        Ok(OrderDetails {
            order,
            lines,
            delivery,
        })
    }

    /// Newest first.
    pub async fn orders_for_user(&self, user_id: i64) -> ServiceResult<Vec<Order>> {
        Ok(self.db.orders().for_user(user_id).await?)
    }

    /// Lines of the user's delivered orders (candidates for a return).
    pub async fn delivered_books(&self, user_id: i64) -> ServiceResult<Vec<OrderLine>> {
        Ok(self.db.orders().delivered_lines(user_id).await?)
    }
}
