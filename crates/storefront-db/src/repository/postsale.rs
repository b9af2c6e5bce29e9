//! # Post-Sale Repositories
//!
//! Cancellation and return requests.
//!
//! ## Quantity Claims
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  INSERT INTO returns (...)                                              │
//! │  SELECT ...                                                             │
//! │   WHERE (SELECT SUM(quantity) FROM returns                              │
//! │           WHERE order_id = ? AND book_id = ?                            │
//! │             AND status IN ('pending','approved','returned'))            │
//! │         + requested <= ordered                                          │
//! │                                                                         │
//! │  One statement: two concurrent requests for the last returnable copy    │
//! │  cannot both be inserted.                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Approvals that touch stock run in a transaction with the stock update.
//! Approving a return also enqueues its delayed restock in the same
//! transaction, so an approved return always has a scheduled task.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::book::restore_in;
use crate::repository::task::insert_task;
use storefront_core::{Cancellation, DeliveryState, ReturnRequest, ScheduledTask};

const CANCELLATION_COLUMNS: &str =
    "id, order_id, book_id, quantity, reason, other_reason, status, requested_at, decided_at";

const RETURN_COLUMNS: &str = "id, order_id, book_id, quantity, item_price_cents, reason, \
     other_reason, status, request_date, decided_at, returned_at";

/// Fields shared by cancellation and return requests.
#[derive(Debug, Clone)]
pub struct NewClaim<'a> {
    pub order_id: i64,
    pub book_id: i64,
    pub quantity: i64,
    pub reason: &'a str,
    pub other_reason: Option<&'a str>,
    /// Ordered quantity of the line, the upper bound for all claims.
    pub ordered: i64,
    pub at: DateTime<Utc>,
}

/// Result of a bounded insert.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim<T> {
    Created(T),
    Exceeded { remaining: i64 },
}

/// Result of approving a cancellation.
#[derive(Debug, Clone, PartialEq)]
pub enum CancellationApproval {
    Approved(Cancellation),
    NotPending,
    OrderDelivered,
}

// =============================================================================
// Cancellations
// =============================================================================

#[derive(Debug, Clone)]
pub struct CancellationRepository {
    pool: SqlitePool,
}

impl CancellationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CancellationRepository { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Cancellation>> {
        let row = sqlx::query_as::<_, Cancellation>(&format!(
            "SELECT {CANCELLATION_COLUMNS} FROM cancellations WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn for_order(&self, order_id: i64) -> DbResult<Vec<Cancellation>> {
        let rows = sqlx::query_as::<_, Cancellation>(&format!(
            "SELECT {CANCELLATION_COLUMNS} FROM cancellations WHERE order_id = ?1 ORDER BY id"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn pending(&self) -> DbResult<Vec<Cancellation>> {
        let rows = sqlx::query_as::<_, Cancellation>(&format!(
            "SELECT {CANCELLATION_COLUMNS} FROM cancellations WHERE status = 'pending' ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Quantity held by pending and approved cancellations of one line.
    pub async fn claimed_quantity(&self, order_id: i64, book_id: i64) -> DbResult<i64> {
        let claimed: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(quantity), 0) FROM cancellations
             WHERE order_id = ?1 AND book_id = ?2 AND status IN ('pending', 'approved')
            "#,
        )
        .bind(order_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(claimed)
    }

    /// Inserts a pending cancellation unless it would over-claim the line.
    pub async fn insert_bounded(&self, claim: &NewClaim<'_>) -> DbResult<Claim<Cancellation>> {
        let result = sqlx::query(
            r#"
            INSERT INTO cancellations (
                order_id, book_id, quantity, reason, other_reason, status, requested_at
            )
            SELECT ?1, ?2, ?3, ?4, ?5, 'pending', ?6
             WHERE (SELECT COALESCE(SUM(quantity), 0) FROM cancellations
                     WHERE order_id = ?1 AND book_id = ?2
                       AND status IN ('pending', 'approved')) + ?3 <= ?7
            "#,
        )
        .bind(claim.order_id)
        .bind(claim.book_id)
        .bind(claim.quantity)
        .bind(claim.reason)
        .bind(claim.other_reason)
        .bind(claim.at)
        .bind(claim.ordered)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let claimed = self.claimed_quantity(claim.order_id, claim.book_id).await?;
            return Ok(Claim::Exceeded {
                remaining: (claim.ordered - claimed).max(0),
            });
        }

        let id = result.last_insert_rowid();
        debug!(cancellation_id = id, order_id = claim.order_id, "Cancellation requested");

        self.get_by_id(id)
            .await?
            .map(Claim::Created)
            .ok_or_else(|| DbError::not_found("Cancellation", id))
    }

    /// `pending → approved`, delivery `→ cancelled`, stock restored. One transaction.
    pub async fn approve(&self, id: i64, at: DateTime<Utc>) -> DbResult<CancellationApproval> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE cancellations SET status = 'approved', decided_at = ?2 WHERE id = ?1 AND status = 'pending'",
        )
        .bind(id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(CancellationApproval::NotPending);
        }

        let row = sqlx::query_as::<_, Cancellation>(&format!(
            "SELECT {CANCELLATION_COLUMNS} FROM cancellations WHERE id = ?1"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let state: Option<DeliveryState> =
            sqlx::query_scalar("SELECT state FROM delivery_statuses WHERE order_id = ?1")
                .bind(row.order_id)
                .fetch_optional(&mut *tx)
                .await?;

        if state == Some(DeliveryState::Delivered) {
            tx.rollback().await?;
            return Ok(CancellationApproval::OrderDelivered);
        }

        sqlx::query(
            r#"
            UPDATE delivery_statuses SET state = 'cancelled', updated_at = ?2
             WHERE order_id = ?1 AND state IN ('processing', 'in_transit')
            "#,
        )
        .bind(row.order_id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        restore_in(&mut tx, row.book_id, row.quantity, at).await?;

        tx.commit().await?;

        debug!(
            cancellation_id = id,
            order_id = row.order_id,
            book_id = row.book_id,
            quantity = row.quantity,
            "Cancellation approved, stock restored"
        );
        Ok(CancellationApproval::Approved(row))
    }

    /// `pending → rejected`. Returns false if the row was not pending.
    pub async fn reject(&self, id: i64, at: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE cancellations SET status = 'rejected', decided_at = ?2 WHERE id = ?1 AND status = 'pending'",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Returns
// =============================================================================

#[derive(Debug, Clone)]
pub struct ReturnRepository {
    pool: SqlitePool,
}

impl ReturnRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReturnRepository { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<ReturnRequest>> {
        let row = sqlx::query_as::<_, ReturnRequest>(&format!(
            "SELECT {RETURN_COLUMNS} FROM returns WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn for_order(&self, order_id: i64) -> DbResult<Vec<ReturnRequest>> {
        let rows = sqlx::query_as::<_, ReturnRequest>(&format!(
            "SELECT {RETURN_COLUMNS} FROM returns WHERE order_id = ?1 ORDER BY id"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn pending(&self) -> DbResult<Vec<ReturnRequest>> {
        let rows = sqlx::query_as::<_, ReturnRequest>(&format!(
            "SELECT {RETURN_COLUMNS} FROM returns WHERE status = 'pending' ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Quantity held by pending, approved and returned requests of one line.
    pub async fn claimed_quantity(&self, order_id: i64, book_id: i64) -> DbResult<i64> {
        let claimed: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(quantity), 0) FROM returns
             WHERE order_id = ?1 AND book_id = ?2
               AND status IN ('pending', 'approved', 'returned')
            "#,
        )
        .bind(order_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(claimed)
    }

    /// Inserts a pending return unless it would over-claim the line.
    pub async fn insert_bounded(
        &self,
        claim: &NewClaim<'_>,
        item_price_cents: i64,
    ) -> DbResult<Claim<ReturnRequest>> {
        let result = sqlx::query(
            r#"
            INSERT INTO returns (
                order_id, book_id, quantity, item_price_cents,
                reason, other_reason, status, request_date
            )
            SELECT ?1, ?2, ?3, ?8, ?4, ?5, 'pending', ?6
             WHERE (SELECT COALESCE(SUM(quantity), 0) FROM returns
                     WHERE order_id = ?1 AND book_id = ?2
                       AND status IN ('pending', 'approved', 'returned')) + ?3 <= ?7
            "#,
        )
        .bind(claim.order_id)
        .bind(claim.book_id)
        .bind(claim.quantity)
        .bind(claim.reason)
        .bind(claim.other_reason)
        .bind(claim.at)
        .bind(claim.ordered)
        .bind(item_price_cents)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let claimed = self.claimed_quantity(claim.order_id, claim.book_id).await?;
            return Ok(Claim::Exceeded {
                remaining: (claim.ordered - claimed).max(0),
            });
        }

        let id = result.last_insert_rowid();
        debug!(return_id = id, order_id = claim.order_id, "Return requested");

        self.get_by_id(id)
            .await?
            .map(Claim::Created)
            .ok_or_else(|| DbError::not_found("Return", id))
    }

    /// `pending → approved` and enqueue the delayed restock. One transaction.
    /// Returns false if the row was not pending.
    pub async fn approve_and_schedule(&self, id: i64, at: DateTime<Utc>, task: &ScheduledTask) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE returns SET status = 'approved', decided_at = ?2 WHERE id = ?1 AND status = 'pending'",
        )
        .bind(id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_task(&mut *tx, task).await?;

        tx.commit().await?;

        debug!(return_id = id, task_id = %task.id, due_at_ms = task.due_at_ms, "Return approved, restock scheduled");
        Ok(true)
    }

    /// `pending → rejected`. Returns false if the row was not pending.
    pub async fn reject(&self, id: i64, at: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE returns SET status = 'rejected', decided_at = ?2 WHERE id = ?1 AND status = 'pending'",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `approved → returned` and restore stock. One transaction.
    /// `None` if the row was not approved (already completed, or never approved).
    pub async fn complete(&self, id: i64, at: DateTime<Utc>) -> DbResult<Option<ReturnRequest>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE returns SET status = 'returned', returned_at = ?2 WHERE id = ?1 AND status = 'approved'",
        )
        .bind(id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query_as::<_, ReturnRequest>(&format!(
            "SELECT {RETURN_COLUMNS} FROM returns WHERE id = ?1"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        restore_in(&mut tx, row.book_id, row.quantity, at).await?;

        tx.commit().await?;

        debug!(return_id = id, book_id = row.book_id, quantity = row.quantity, "Return completed, stock restored");
        Ok(Some(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use storefront_core::money::Money;
    use storefront_core::pricing::{OrderQuote, PricedLine};
    use storefront_core::{CancellationStatus, DiscountRate, NewBook, ReturnStatus};

    async fn setup() -> (Database, i64, i64) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let book = db
            .books()
            .insert(&NewBook {
                title: "Persuasion".to_string(),
                price_cents: 1200,
                cost_cents: 500,
                available_quantity: 0,
            })
            .await
            .unwrap();
        let quote = OrderQuote::new(
            vec![PricedLine::new(book.id, 3, Money::from_cents(1200), DiscountRate::zero())],
            Money::from_cents(1000),
        );
        let (order, _) = db.orders().create_pending(1, 1, Utc::now(), &quote).await.unwrap();
        db.orders().mark_committed(order.id).await.unwrap();
        db.deliveries().open(order.id).await.unwrap();
        (db, order.id, book.id)
    }

    fn claim(order_id: i64, book_id: i64, quantity: i64) -> NewClaim<'static> {
        NewClaim {
            order_id,
            book_id,
            quantity,
            reason: "changed mind",
            other_reason: None,
            ordered: 3,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_cancellation_bound_and_approval() {
        let (db, order_id, book_id) = setup().await;
        let repo = db.cancellations();

        let created = match repo.insert_bounded(&claim(order_id, book_id, 2)).await.unwrap() {
            Claim::Created(c) => c,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(created.status, CancellationStatus::Pending);

        assert_eq!(
            repo.insert_bounded(&claim(order_id, book_id, 2)).await.unwrap(),
            Claim::Exceeded { remaining: 1 }
        );

        let approval = repo.approve(created.id, Utc::now()).await.unwrap();
        assert!(matches!(approval, CancellationApproval::Approved(_)));
        assert_eq!(db.books().available_quantity(book_id).await.unwrap(), Some(2));
        assert_eq!(
            db.deliveries().get(order_id).await.unwrap().unwrap().state,
            DeliveryState::Cancelled
        );

        // Second approval is a no-op
        assert_eq!(
            repo.approve(created.id, Utc::now()).await.unwrap(),
            CancellationApproval::NotPending
        );
        assert_eq!(db.books().available_quantity(book_id).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_cancellation_after_delivery_is_refused() {
        let (db, order_id, book_id) = setup().await;
        let Claim::Created(created) = db
            .cancellations()
            .insert_bounded(&claim(order_id, book_id, 1))
            .await
            .unwrap()
        else {
            panic!("expected created");
        };

        let deliveries = db.deliveries();
        deliveries
            .transition(order_id, DeliveryState::Processing, DeliveryState::InTransit)
            .await
            .unwrap();
        deliveries
            .transition(order_id, DeliveryState::InTransit, DeliveryState::Delivered)
            .await
            .unwrap();

        assert_eq!(
            db.cancellations().approve(created.id, Utc::now()).await.unwrap(),
            CancellationApproval::OrderDelivered
        );
        let row = db.cancellations().get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(row.status, CancellationStatus::Pending);
        assert_eq!(db.books().available_quantity(book_id).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_rejected_returns_release_quantity() {
        let (db, order_id, book_id) = setup().await;
        let repo = db.returns();

        let Claim::Created(first) = repo.insert_bounded(&claim(order_id, book_id, 3), 1200).await.unwrap() else {
            panic!("expected created");
        };
        assert_eq!(
            repo.insert_bounded(&claim(order_id, book_id, 1), 1200).await.unwrap(),
            Claim::Exceeded { remaining: 0 }
        );

        assert!(repo.reject(first.id, Utc::now()).await.unwrap());
        assert_eq!(repo.claimed_quantity(order_id, book_id).await.unwrap(), 0);
        assert!(matches!(
            repo.insert_bounded(&claim(order_id, book_id, 1), 1200).await.unwrap(),
            Claim::Created(_)
        ));
    }

    #[tokio::test]
    async fn test_complete_requires_approval() {
        let (db, order_id, book_id) = setup().await;
        let repo = db.returns();

        let Claim::Created(request) = repo.insert_bounded(&claim(order_id, book_id, 2), 1200).await.unwrap() else {
            panic!("expected created");
        };
        assert_eq!(repo.complete(request.id, Utc::now()).await.unwrap(), None);

        let task = crate::repository::task::new_task(
            storefront_core::TaskKind::ReturnRestock,
            format!(r#"{{"return_id":{}}}"#, request.id),
            0,
        );
        assert!(repo.approve_and_schedule(request.id, Utc::now(), &task).await.unwrap());
        assert_eq!(db.tasks().count_pending().await.unwrap(), 1);

        let done = repo.complete(request.id, Utc::now()).await.unwrap().unwrap();
        assert_eq!(done.status, ReturnStatus::Returned);
        assert_eq!(db.books().available_quantity(book_id).await.unwrap(), Some(2));

        // Idempotent: a second completion restores nothing
        assert_eq!(repo.complete(request.id, Utc::now()).await.unwrap(), None);
        assert_eq!(db.books().available_quantity(book_id).await.unwrap(), Some(2));
    }
}
