//! # Discount Repository
//!
//! Discount records and their links to books.
//!
//! Applying a discount is "end whatever is active, then insert the new one".
//! Here both halves run in one transaction per call. Readers that race the
//! transaction still resolve deterministically through the tie-break in
//! `storefront_core::discount`.
//!
//! ## Ending for one book
//! ```text
//! discounts       id=7  end_date=NULL          shared by A and B
//! book_discounts  (A, 7) ended_at=t            ended for A only
//!                 (B, 7) ended_at=NULL         still active for B
//!
//! effective end for a book = earliest of end_date and ended_at
//! ```
//! `discounts.end_date` is only set once no link is left open.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use storefront_core::Discount;

const DISCOUNT_COLUMNS: &str = "d.id, d.name, d.rate_bps, d.start_date, d.end_date";

/// A discount as seen by one book.
#[derive(FromRow)]
struct LinkedDiscount {
    id: i64,
    name: String,
    rate_bps: u32,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl From<LinkedDiscount> for Discount {
    fn from(row: LinkedDiscount) -> Self {
        let end_date = match (row.end_date, row.ended_at) {
            (Some(end), Some(ended)) => Some(end.min(ended)),
            (end, ended) => end.or(ended),
        };
        Discount {
            id: row.id,
            name: row.name,
            rate_bps: row.rate_bps,
            start_date: row.start_date,
            end_date,
        }
    }
}

async fn linked_discounts(conn: &mut SqliteConnection, book_id: i64) -> DbResult<Vec<Discount>> {
    let rows = sqlx::query_as::<_, LinkedDiscount>(&format!(
        r#"
        SELECT {DISCOUNT_COLUMNS}, bd.ended_at
          FROM discounts d
          JOIN book_discounts bd ON bd.discount_id = d.id
         WHERE bd.book_id = ?1
         ORDER BY d.id
        "#
    ))
    .bind(book_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Discount::from).collect())
}

/// Ends every discount active for `book_id` at `at`, for that book only.
async fn end_active_for_book(conn: &mut SqliteConnection, book_id: i64, at: DateTime<Utc>) -> DbResult<usize> {
    let active: Vec<Discount> = linked_discounts(&mut *conn, book_id)
        .await?
        .into_iter()
        .filter(|d| d.is_active_at(at))
        .collect();

    for discount in &active {
        sqlx::query("UPDATE book_discounts SET ended_at = ?3 WHERE book_id = ?1 AND discount_id = ?2")
            .bind(book_id)
            .bind(discount.id)
            .bind(at)
            .execute(&mut *conn)
            .await?;

        let still_open: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM book_discounts WHERE discount_id = ?1 AND ended_at IS NULL",
        )
        .bind(discount.id)
        .fetch_one(&mut *conn)
        .await?;

        if still_open == 0 {
            sqlx::query("UPDATE discounts SET end_date = ?2 WHERE id = ?1")
                .bind(discount.id)
                .bind(at)
                .execute(&mut *conn)
                .await?;
        }

        debug!(discount_id = discount.id, book_id, still_open, "Ended active discount for book");
    }

    Ok(active.len())
}

/// Repository for discount database operations.
#[derive(Debug, Clone)]
pub struct DiscountRepository {
    pool: SqlitePool,
}

impl DiscountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DiscountRepository { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Discount>> {
        let discount = sqlx::query_as::<_, Discount>(&format!(
            "SELECT {DISCOUNT_COLUMNS} FROM discounts d WHERE d.id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(discount)
    }

    /// Every discount ever linked to a book, in id order, with the end date
    /// as this book sees it.
    pub async fn for_book(&self, book_id: i64) -> DbResult<Vec<Discount>> {
        let mut conn = self.pool.acquire().await?;
        linked_discounts(&mut *conn, book_id).await
    }

    /// Book ids a discount is linked to.
    pub async fn books_for(&self, discount_id: i64) -> DbResult<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT book_id FROM book_discounts WHERE discount_id = ?1 ORDER BY book_id",
        )
        .bind(discount_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Ends every discount active on `book_id` at `at` without touching
    /// other books that share them. Returns how many ended.
    pub async fn end_active(&self, book_id: i64, at: DateTime<Utc>) -> DbResult<usize> {
        let mut tx = self.pool.begin().await?;
        let ended = end_active_for_book(&mut *tx, book_id, at).await?;
        tx.commit().await?;
        Ok(ended)
    }

    /// Ends every discount of `book_ids` active at `at`, then inserts one new
    /// discount starting at `at` and links it to all of them.
    pub async fn replace_active(
        &self,
        book_ids: &[i64],
        name: &str,
        rate_bps: u32,
        at: DateTime<Utc>,
        end_date: Option<DateTime<Utc>>,
    ) -> DbResult<Discount> {
        let mut tx = self.pool.begin().await?;

        for &book_id in book_ids {
            end_active_for_book(&mut *tx, book_id, at).await?;
        }

        let inserted = sqlx::query(
            "INSERT INTO discounts (name, rate_bps, start_date, end_date) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(name)
        .bind(rate_bps)
        .bind(at)
        .bind(end_date)
        .execute(&mut *tx)
        .await?;
        let discount_id = inserted.last_insert_rowid();

        for &book_id in book_ids {
            sqlx::query("INSERT INTO book_discounts (book_id, discount_id) VALUES (?1, ?2)")
                .bind(book_id)
                .bind(discount_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        debug!(discount_id, books = book_ids.len(), rate_bps, "Discount applied");

        self.get_by_id(discount_id)
            .await?
            .ok_or_else(|| DbError::not_found("Discount", discount_id))
    }

    /// Sets `end_date` for every book the discount is linked to.
    pub async fn set_end_date(&self, id: i64, end_date: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query("UPDATE discounts SET end_date = ?2 WHERE id = ?1")
            .bind(id)
            .bind(end_date)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Discount", id));
        }

        Ok(())
    }
}
