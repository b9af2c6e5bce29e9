//! # Order Repository
//!
//! Orders, their frozen lines, and the one-to-one delivery row.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Lifecycle                                   │
//! │                                                                         │
//! │  1. CREATE (one transaction)                                            │
//! │     └── create_pending() → Order { status: pending } + OrderLines       │
//! │                                                                         │
//! │  2. STOCK (per line, see BookRepository::decrement_for_line)            │
//! │     └── order_lines.stock_decremented = 1                               │
//! │                                                                         │
//! │  3. DELIVERY                                                            │
//! │     └── DeliveryRepository::open() → delivery_statuses 'processing'     │
//! │                                                                         │
//! │  4. COMMIT                                                              │
//! │     └── mark_committed() → Order { status: committed }                  │
//! │                                                                         │
//! │  (any failure after 1)                                                  │
//! │     └── mark_failed() → Order { status: failed, failure_reason }        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use storefront_core::pricing::OrderQuote;
use storefront_core::{DeliveryState, DeliveryStatus, Order, OrderLine, OrderStatus};

const ORDER_COLUMNS: &str = "id, user_id, address_id, order_date, subtotal_cents, shipping_cents, \
     total_price_cents, status, failure_reason, updated_at";

const LINE_COLUMNS: &str = "id, order_id, book_id, quantity, base_price_cents, \
     discount_rate_bps, item_price_cents, stock_decremented";

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Inserts the order row and one line per quoted line in a single
    /// transaction. The order starts `pending`.
    pub async fn create_pending(
        &self,
        user_id: i64,
        address_id: i64,
        order_date: DateTime<Utc>,
        quote: &OrderQuote,
    ) -> DbResult<(Order, Vec<OrderLine>)> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (
                user_id, address_id, order_date,
                subtotal_cents, shipping_cents, total_price_cents,
                status, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?3)
            "#,
        )
        .bind(user_id)
        .bind(address_id)
        .bind(order_date)
        .bind(quote.subtotal.cents())
        .bind(quote.shipping.cents())
        .bind(quote.total.cents())
        .bind(OrderStatus::Pending)
        .execute(&mut *tx)
        .await?;
        let order_id = inserted.last_insert_rowid();

        for line in &quote.lines {
            sqlx::query(
                r#"
                INSERT INTO order_lines (
                    order_id, book_id, quantity,
                    base_price_cents, discount_rate_bps, item_price_cents,
                    stock_decremented
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
                "#,
            )
            .bind(order_id)
            .bind(line.book_id)
            .bind(line.quantity)
            .bind(line.base_price.cents())
            .bind(line.rate.bps())
            .bind(line.item_price.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            order_id,
            user_id,
            lines = quote.lines.len(),
            total_cents = quote.total.cents(),
            "Pending order created"
        );

        let order = self.require(order_id).await?;
        let lines = self.lines(order_id).await?;
        Ok((order, lines))
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    pub async fn require(&self, id: i64) -> DbResult<Order> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", id))
    }

    pub async fn lines(&self, order_id: i64) -> DbResult<Vec<OrderLine>> {
        let lines = sqlx::query_as::<_, OrderLine>(&format!(
            "SELECT {LINE_COLUMNS} FROM order_lines WHERE order_id = ?1 ORDER BY id"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    pub async fn line(&self, order_id: i64, book_id: i64) -> DbResult<Option<OrderLine>> {
        let line = sqlx::query_as::<_, OrderLine>(&format!(
            "SELECT {LINE_COLUMNS} FROM order_lines WHERE order_id = ?1 AND book_id = ?2"
        ))
        .bind(order_id)
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(line)
    }

    /// A user's orders, newest first.
    pub async fn for_user(&self, user_id: i64) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ?1 ORDER BY id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// Orders still `pending`, oldest first.
    pub async fn pending(&self) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE status = 'pending' ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// Lines of committed orders whose delivery reached `delivered`.
    pub async fn delivered_lines(&self, user_id: i64) -> DbResult<Vec<OrderLine>> {
        let lines = sqlx::query_as::<_, OrderLine>(
            r#"
            SELECT ol.id, ol.order_id, ol.book_id, ol.quantity, ol.base_price_cents,
                   ol.discount_rate_bps, ol.item_price_cents, ol.stock_decremented
              FROM order_lines ol
              JOIN orders o ON o.id = ol.order_id
              JOIN delivery_statuses ds ON ds.order_id = o.id
             WHERE o.user_id = ?1
               AND o.status = 'committed'
               AND ds.state = 'delivered'
             ORDER BY o.id DESC, ol.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// `pending → committed`. Returns false if the order was not pending.
    pub async fn mark_committed(&self, id: i64) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE orders SET status = 'committed', updated_at = ?2 WHERE id = ?1 AND status = 'pending'",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `pending → failed` with a reason. Returns false if the order was not pending.
    pub async fn mark_failed(&self, id: i64, reason: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
               SET status = 'failed', failure_reason = ?2, updated_at = ?3
             WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Delivery
// =============================================================================

/// Repository for delivery status rows.
#[derive(Debug, Clone)]
pub struct DeliveryRepository {
    pool: SqlitePool,
}

impl DeliveryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DeliveryRepository { pool }
    }

    /// Inserts the delivery row in `processing`.
    pub async fn open(&self, order_id: i64) -> DbResult<DeliveryStatus> {
        sqlx::query("INSERT INTO delivery_statuses (order_id, state, updated_at) VALUES (?1, ?2, ?3)")
            .bind(order_id)
            .bind(DeliveryState::Processing)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        debug!(order_id, "Delivery opened");

        self.get(order_id)
            .await?
            .ok_or_else(|| DbError::not_found("DeliveryStatus", order_id))
    }

    pub async fn get(&self, order_id: i64) -> DbResult<Option<DeliveryStatus>> {
        let status = sqlx::query_as::<_, DeliveryStatus>(
            "SELECT order_id, state, updated_at FROM delivery_statuses WHERE order_id = ?1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(status)
    }

    /// Compare-and-set on the state. Returns false if the row was not in `from`.
    pub async fn transition(&self, order_id: i64, from: DeliveryState, to: DeliveryState) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE delivery_statuses SET state = ?3, updated_at = ?4 WHERE order_id = ?1 AND state = ?2",
        )
        .bind(order_id)
        .bind(from)
        .bind(to)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use storefront_core::money::Money;
    use storefront_core::pricing::PricedLine;
    use storefront_core::{DiscountRate, NewBook};

    async fn setup() -> (Database, i64) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let book = db
            .books()
            .insert(&NewBook {
                title: "Middlemarch".to_string(),
                price_cents: 2000,
                cost_cents: 800,
                available_quantity: 4,
            })
            .await
            .unwrap();
        (db, book.id)
    }

    fn quote(book_id: i64) -> OrderQuote {
        OrderQuote::new(
            vec![PricedLine::new(book_id, 2, Money::from_cents(2000), DiscountRate::from_percent(25))],
            Money::from_cents(1000),
        )
    }

    #[tokio::test]
    async fn test_create_pending_freezes_prices() {
        let (db, book_id) = setup().await;
        let (order, lines) = db
            .orders()
            .create_pending(1, 3, Utc::now(), &quote(book_id))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_price_cents, 4000);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].item_price_cents, 1500);
        assert_eq!(lines[0].discount_rate_bps, 2500);
        assert!(!lines[0].stock_decremented);
    }

    #[tokio::test]
    async fn test_status_transitions_only_from_pending() {
        let (db, book_id) = setup().await;
        let (order, _) = db
            .orders()
            .create_pending(1, 3, Utc::now(), &quote(book_id))
            .await
            .unwrap();

        assert!(db.orders().mark_committed(order.id).await.unwrap());
        assert!(!db.orders().mark_failed(order.id, "late").await.unwrap());
        assert!(db.orders().pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_transition_is_compare_and_set() {
        let (db, book_id) = setup().await;
        let (order, _) = db
            .orders()
            .create_pending(1, 3, Utc::now(), &quote(book_id))
            .await
            .unwrap();

        let deliveries = db.deliveries();
        let opened = deliveries.open(order.id).await.unwrap();
        assert_eq!(opened.state, DeliveryState::Processing);

        assert!(deliveries
            .transition(order.id, DeliveryState::Processing, DeliveryState::InTransit)
            .await
            .unwrap());
        assert!(!deliveries
            .transition(order.id, DeliveryState::Processing, DeliveryState::Cancelled)
            .await
            .unwrap());

        // Second open for the same order violates the primary key
        let err = deliveries.open(order.id).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }
}
