//! # Stock Ledger
//!
//! Read, decrement and restore a book's available quantity.
//!
//! `decrement` is the only synchronization point in the system: it is a
//! single conditional `UPDATE`, so concurrent buyers can never drive the
//! quantity below zero. `restore` is additive and unguarded.

use tracing::{debug, info};

use storefront_core::validation::validate_quantity;
use storefront_core::{CartLine, OrderLine, StockShortfall};
use storefront_db::{Database, StockUpdate};

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone)]
pub struct StockLedger {
    db: Database,
}

impl StockLedger {
    pub fn new(db: Database) -> Self {
        StockLedger { db }
    }

    /// Copies on hand.
    pub async fn available(&self, book_id: i64) -> ServiceResult<i64> {
        self.db
            .books()
            .available_quantity(book_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Book", book_id))
    }

    /// Advisory read. Only [`decrement`](Self::decrement) is authoritative.
    pub async fn check_available(&self, book_id: i64, quantity: i64) -> ServiceResult<bool> {
        Ok(self.available(book_id).await? >= quantity)
    }

    /// Every line the current stock cannot cover.
    pub async fn shortfalls(&self, lines: &[CartLine]) -> ServiceResult<Vec<StockShortfall>> {
        let mut shortfalls = Vec::new();

        for line in lines {
            let available = self.available(line.book_id).await?;
            if available < line.quantity {
                shortfalls.push(StockShortfall {
                    book_id: line.book_id,
                    requested: line.quantity,
                    available,
                });
            }
        }

        Ok(shortfalls)
    }

    /// Removes copies, or fails without touching the row.
    pub async fn decrement(&self, book_id: i64, quantity: i64) -> ServiceResult<()> {
        validate_quantity(quantity)?;

        match self.db.books().decrement_stock(book_id, quantity).await? {
            StockUpdate::Insufficient { available } => {
                Err(ServiceError::InsufficientStock(StockShortfall {
                    book_id,
                    requested: quantity,
                    available,
                }))
            }
            StockUpdate::Applied | StockUpdate::AlreadyApplied => Ok(()),
        }
    }

    /// Adds copies back (restock, approved cancellation, completed return).
    pub async fn restore(&self, book_id: i64, quantity: i64) -> ServiceResult<()> {
        validate_quantity(quantity)?;
        self.db.books().restore_stock(book_id, quantity).await?;
        info!(book_id, quantity, "Stock restored");
        Ok(())
    }

    /// Decrement for an order line, journalled on the line itself.
    pub async fn decrement_line(&self, line: &OrderLine) -> ServiceResult<StockUpdate> {
        let update = self
            .db
            .books()
            .decrement_for_line(line.id, line.book_id, line.quantity)
            .await?;
        debug!(line_id = line.id, book_id = line.book_id, ?update, "Line decrement");
        Ok(update)
    }

    /// Undoes [`decrement_line`](Self::decrement_line). No-op for a line
    /// that was never decremented.
    pub async fn restore_line(&self, line: &OrderLine) -> ServiceResult<StockUpdate> {
        let update = self
            .db
            .books()
            .restore_for_line(line.id, line.book_id, line.quantity)
            .await?;
        debug!(line_id = line.id, book_id = line.book_id, ?update, "Line restore");
        Ok(update)
    }
}
