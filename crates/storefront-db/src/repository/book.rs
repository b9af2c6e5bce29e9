//! # Book Repository
//!
//! Catalog rows and the stock column.
//!
//! ## The Conditional Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Two buyers, one copy left (available_quantity = 1)                     │
//! │                                                                         │
//! │  Buyer A                                Buyer B                         │
//! │  UPDATE books                           UPDATE books                    │
//! │     SET available_quantity =               SET available_quantity =     │
//! │         available_quantity - 1                 available_quantity - 1   │
//! │   WHERE id = 7                           WHERE id = 7                   │
//! │     AND available_quantity >= 1            AND available_quantity >= 1  │
//! │       │                                        │                        │
//! │       ▼                                        ▼                        │
//! │  rows_affected = 1  ✓                    rows_affected = 0  ✗           │
//! │                                                                         │
//! │  The read, the comparison and the write are one statement, so no       │
//! │  interleaving can take the column below zero.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Restores have no guard: adding copies is always safe.
//!
//! The `*_for_line` variants also flip `order_lines.stock_decremented` in the
//! same transaction, so a crash can never leave the stock and the saga
//! journal disagreeing.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use storefront_core::{Book, NewBook};

const BOOK_COLUMNS: &str =
    "id, title, price_cents, cost_cents, available_quantity, created_at, updated_at";

/// Outcome of a guarded stock update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockUpdate {
    /// The quantity changed.
    Applied,
    /// Not enough copies. Nothing changed.
    Insufficient { available: i64 },
    /// The order line was already in the requested state. Nothing changed.
    AlreadyApplied,
}

/// Repository for book database operations.
#[derive(Debug, Clone)]
pub struct BookRepository {
    pool: SqlitePool,
}

impl BookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BookRepository { pool }
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(book)
    }

    /// Like [`get_by_id`](Self::get_by_id) but a missing row is an error.
    pub async fn require(&self, id: i64) -> DbResult<Book> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Book", id))
    }

    pub async fn insert(&self, book: &NewBook) -> DbResult<Book> {
        let now = Utc::now();

        debug!(title = %book.title, "Inserting book");

        let result = sqlx::query(
            r#"
            INSERT INTO books (
                title, price_cents, cost_cents, available_quantity,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
        )
        .bind(&book.title)
        .bind(book.price_cents)
        .bind(book.cost_cents)
        .bind(book.available_quantity)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.require(result.last_insert_rowid()).await
    }

    /// Lists books ordered by title.
    pub async fn list(&self, limit: u32) -> DbResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books ORDER BY title, id LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(books)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Direct price edit. Existing order lines keep their frozen prices.
    pub async fn update_price(&self, id: i64, price_cents: i64) -> DbResult<Book> {
        debug!(book_id = id, price_cents, "Updating book price");

        let result = sqlx::query("UPDATE books SET price_cents = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(price_cents)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Book", id));
        }

        self.require(id).await
    }

    pub async fn update_cost(&self, id: i64, cost_cents: i64) -> DbResult<Book> {
        let result = sqlx::query("UPDATE books SET cost_cents = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(cost_cents)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Book", id));
        }

        self.require(id).await
    }

    // =========================================================================
    // Stock
    // =========================================================================

    /// Current copies on hand, `None` if the book does not exist.
    pub async fn available_quantity(&self, id: i64) -> DbResult<Option<i64>> {
        let qty: Option<i64> =
            sqlx::query_scalar("SELECT available_quantity FROM books WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(qty)
    }

    /// Conditional decrement. Never drives the quantity below zero.
    pub async fn decrement_stock(&self, id: i64, quantity: i64) -> DbResult<StockUpdate> {
        let result = sqlx::query(
            r#"
            UPDATE books
               SET available_quantity = available_quantity - ?2,
                   updated_at = ?3
             WHERE id = ?1 AND available_quantity >= ?2
            "#,
        )
        .bind(id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            debug!(book_id = id, quantity, "Stock decremented");
            return Ok(StockUpdate::Applied);
        }

        let available = self
            .available_quantity(id)
            .await?
            .ok_or_else(|| DbError::not_found("Book", id))?;

        Ok(StockUpdate::Insufficient { available })
    }

    /// Adds copies back. Unconditional.
    pub async fn restore_stock(&self, id: i64, quantity: i64) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE books
               SET available_quantity = available_quantity + ?2,
                   updated_at = ?3
             WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Book", id));
        }

        debug!(book_id = id, quantity, "Stock restored");
        Ok(())
    }

    /// Conditional decrement for one order line, journalled on the line.
    ///
    /// ```text
    /// BEGIN
    ///   UPDATE order_lines SET stock_decremented = 1 WHERE id = ? AND stock_decremented = 0
    ///     └── 0 rows → already applied, ROLLBACK
    ///   UPDATE books SET available_quantity = available_quantity - q
    ///    WHERE id = ? AND available_quantity >= q
    ///     └── 0 rows → insufficient, ROLLBACK
    /// COMMIT
    /// ```
    pub async fn decrement_for_line(&self, line_id: i64, book_id: i64, quantity: i64) -> DbResult<StockUpdate> {
        let mut tx = self.pool.begin().await?;

        let marked = sqlx::query(
            "UPDATE order_lines SET stock_decremented = 1 WHERE id = ?1 AND stock_decremented = 0",
        )
        .bind(line_id)
        .execute(&mut *tx)
        .await?;

        if marked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(StockUpdate::AlreadyApplied);
        }

        let decremented = sqlx::query(
            r#"
            UPDATE books
               SET available_quantity = available_quantity - ?2,
                   updated_at = ?3
             WHERE id = ?1 AND available_quantity >= ?2
            "#,
        )
        .bind(book_id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if decremented.rows_affected() == 0 {
            let available: Option<i64> =
                sqlx::query_scalar("SELECT available_quantity FROM books WHERE id = ?1")
                    .bind(book_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return Ok(StockUpdate::Insufficient {
                available: available.unwrap_or(0),
            });
        }

        tx.commit().await?;
        debug!(line_id, book_id, quantity, "Stock decremented for order line");
        Ok(StockUpdate::Applied)
    }

    /// Reverses [`decrement_for_line`](Self::decrement_for_line). A line that
    /// was never decremented is left alone.
    pub async fn restore_for_line(&self, line_id: i64, book_id: i64, quantity: i64) -> DbResult<StockUpdate> {
        let mut tx = self.pool.begin().await?;

        let unmarked = sqlx::query(
            "UPDATE order_lines SET stock_decremented = 0 WHERE id = ?1 AND stock_decremented = 1",
        )
        .bind(line_id)
        .execute(&mut *tx)
        .await?;

        if unmarked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(StockUpdate::AlreadyApplied);
        }

        restore_in(&mut tx, book_id, quantity, Utc::now()).await?;

        tx.commit().await?;
        debug!(line_id, book_id, quantity, "Stock restored for order line");
        Ok(StockUpdate::Applied)
    }
}

/// Stock restore inside a caller's transaction.
pub(crate) async fn restore_in(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    book_id: i64,
    quantity: i64,
    at: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE books
           SET available_quantity = available_quantity + ?2,
               updated_at = ?3
         WHERE id = ?1
        "#,
    )
    .bind(book_id)
    .bind(quantity)
    .bind(at)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Book", book_id));
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    async fn setup() -> (Database, Book) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let book = db
            .books()
            .insert(&NewBook {
                title: "Dune".to_string(),
                price_cents: 2000,
                cost_cents: 900,
                available_quantity: 3,
            })
            .await
            .unwrap();
        (db, book)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (db, book) = setup().await;
        let fetched = db.books().get_by_id(book.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Dune");
        assert_eq!(fetched.available_quantity, 3);
        assert_eq!(db.books().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_decrement_is_conditional() {
        let (db, book) = setup().await;
        let repo = db.books();

        assert_eq!(repo.decrement_stock(book.id, 2).await.unwrap(), StockUpdate::Applied);
        assert_eq!(
            repo.decrement_stock(book.id, 2).await.unwrap(),
            StockUpdate::Insufficient { available: 1 }
        );
        assert_eq!(repo.available_quantity(book.id).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_restore_adds_copies() {
        let (db, book) = setup().await;
        db.books().restore_stock(book.id, 4).await.unwrap();
        assert_eq!(db.books().available_quantity(book.id).await.unwrap(), Some(7));

        let err = db.books().restore_stock(9999, 1).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_price() {
        let (db, book) = setup().await;
        let updated = db.books().update_price(book.id, 2500).await.unwrap();
        assert_eq!(updated.price_cents, 2500);
        assert!(db.books().update_price(4242, 100).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_negative_stock_rejected_by_schema() {
        let (db, book) = setup().await;
        let err = sqlx::query("UPDATE books SET available_quantity = -1 WHERE id = ?1")
            .bind(book.id)
            .execute(db.pool())
            .await
            .map_err(DbError::from)
            .unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }
}
