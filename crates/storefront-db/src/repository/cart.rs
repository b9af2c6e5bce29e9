//! # Account Cart Repository
//!
//! Persisted carts keyed by user id.
//!
//! ```text
//! carts (one per user, created on first write)
//!   └── cart_items (cart_id, book_id) → quantity > 0
//! ```
//!
//! Reads never create a cart. Writes go through get-or-create.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use storefront_core::CartLine;

/// Repository for account cart operations.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// Returns the user's cart id, creating the cart if absent.
    pub async fn get_or_create(&self, user_id: i64) -> DbResult<i64> {
        sqlx::query("INSERT INTO carts (user_id, created_at) VALUES (?1, ?2) ON CONFLICT(user_id) DO NOTHING")
            .bind(user_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        let cart_id: i64 = sqlx::query_scalar("SELECT id FROM carts WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(cart_id)
    }

    /// Lines of the user's cart in insertion order. Empty if no cart exists.
    pub async fn lines(&self, user_id: i64) -> DbResult<Vec<CartLine>> {
        let lines = sqlx::query_as::<_, CartLine>(
            r#"
            SELECT ci.book_id, ci.quantity, NULL AS unit_price_cents
              FROM cart_items ci
              JOIN carts c ON c.id = ci.cart_id
             WHERE c.user_id = ?1
             ORDER BY ci.rowid
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    pub async fn quantity_of(&self, user_id: i64, book_id: i64) -> DbResult<Option<i64>> {
        let qty: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT ci.quantity
              FROM cart_items ci
              JOIN carts c ON c.id = ci.cart_id
             WHERE c.user_id = ?1 AND ci.book_id = ?2
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(qty)
    }

    /// Upsert that adds to an existing line.
    pub async fn add_quantity(&self, user_id: i64, book_id: i64, quantity: i64) -> DbResult<()> {
        let cart_id = self.get_or_create(user_id).await?;

        debug!(user_id, book_id, quantity, "Adding to account cart");

        sqlx::query(
            r#"
            INSERT INTO cart_items (cart_id, book_id, quantity, added_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(cart_id, book_id)
            DO UPDATE SET quantity = quantity + excluded.quantity
            "#,
        )
        .bind(cart_id)
        .bind(book_id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upsert that overwrites the line. Zero or below deletes it.
    pub async fn set_quantity(&self, user_id: i64, book_id: i64, quantity: i64) -> DbResult<()> {
        if quantity <= 0 {
            self.remove(user_id, book_id).await?;
            return Ok(());
        }

        let cart_id = self.get_or_create(user_id).await?;

        sqlx::query(
            r#"
            INSERT INTO cart_items (cart_id, book_id, quantity, added_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(cart_id, book_id)
            DO UPDATE SET quantity = excluded.quantity
            "#,
        )
        .bind(cart_id)
        .bind(book_id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes one line. Returns whether it existed.
    pub async fn remove(&self, user_id: i64, book_id: i64) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM cart_items
             WHERE book_id = ?2
               AND cart_id = (SELECT id FROM carts WHERE user_id = ?1)
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Empties the cart. The cart row itself is kept.
    pub async fn clear(&self, user_id: i64) -> DbResult<u64> {
        let result = sqlx::query(
            "DELETE FROM cart_items WHERE cart_id = (SELECT id FROM carts WHERE user_id = ?1)",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        debug!(user_id, removed = result.rows_affected(), "Account cart cleared");
        Ok(result.rows_affected())
    }
}
