//! # Catalog Administration
//!
//! Direct edits that bypass the order saga. They take effect on the next
//! resolution or order placement and never touch existing order lines.

use chrono::{DateTime, Utc};
use tracing::info;

use storefront_core::discount::active_discount;
use storefront_core::validation::{validate_book_title, validate_id, validate_price_cents, validate_quantity};
use storefront_core::{Book, BookListing, NewBook, ValidationError};
use storefront_db::Database;

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone)]
pub struct CatalogService {
    db: Database,
}

impl CatalogService {
    pub fn new(db: Database) -> Self {
        CatalogService { db }
    }

    pub async fn add_book(&self, book: NewBook) -> ServiceResult<Book> {
        validate_book_title(&book.title)?;
        validate_price_cents(book.price_cents)?;
        validate_price_cents(book.cost_cents)?;
        if book.available_quantity < 0 {
            return Err(ValidationError::OutOfRange {
                field: "available_quantity".into(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }

        let inserted = self.db.books().insert(&book).await?;
        info!(book_id = inserted.id, title = %inserted.title, "Book added");
        Ok(inserted)
    }

    pub async fn book(&self, book_id: i64) -> ServiceResult<Book> {
        self.db
            .books()
            .get_by_id(book_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Book", book_id))
    }

    pub async fn update_price(&self, book_id: i64, price_cents: i64) -> ServiceResult<Book> {
        validate_id("book_id", book_id)?;
        validate_price_cents(price_cents)?;
        let book = self.db.books().update_price(book_id, price_cents).await?;
        info!(book_id, price_cents, "Price updated");
        Ok(book)
    }

    pub async fn update_cost(&self, book_id: i64, cost_cents: i64) -> ServiceResult<Book> {
        validate_id("book_id", book_id)?;
        validate_price_cents(cost_cents)?;
        Ok(self.db.books().update_cost(book_id, cost_cents).await?)
    }

    /// Receives new copies from a supplier.
    pub async fn restock(&self, book_id: i64, quantity: i64) -> ServiceResult<Book> {
        validate_quantity(quantity)?;
        self.db.books().restore_stock(book_id, quantity).await?;
        info!(book_id, quantity, "Book restocked");
        self.book(book_id).await
    }

    /// Books with the discount that applies at `at` and the resulting price.
    pub async fn listings(&self, limit: u32, at: DateTime<Utc>) -> ServiceResult<Vec<BookListing>> {
        let books = self.db.books().list(limit).await?;
        let mut listings = Vec::with_capacity(books.len());

        for book in books {
            let discounts = self.db.discounts().for_book(book.id).await?;
            let discount = active_discount(&discounts, at).cloned();
            let effective = match &discount {
                Some(d) => book.price().apply_discount(d.rate()),
                None => book.price(),
            };

            listings.push(BookListing {
                effective_price_cents: effective.cents(),
                discount,
                book,
            });
        }

        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use storefront_db::DbConfig;

    fn new_book(title: &str, price_cents: i64) -> NewBook {
        NewBook {
            title: title.to_string(),
            price_cents,
            cost_cents: price_cents / 2,
            available_quantity: 3,
        }
    }

    #[tokio::test]
    async fn test_listing_shows_effective_price() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = CatalogService::new(db.clone());

        let book = catalog.add_book(new_book("Emma", 2000)).await.unwrap();
        catalog.add_book(new_book("Ivanhoe", 1000)).await.unwrap();

        db.discounts()
            .replace_active(&[book.id], "Quarter off", 2500, Utc::now() - Duration::hours(1), None)
            .await
            .unwrap();

        let listings = catalog.listings(10, Utc::now()).await.unwrap();
        let emma = listings.iter().find(|l| l.book.id == book.id).unwrap();
        assert_eq!(emma.effective_price_cents, 1500);
        assert!(emma.discount.is_some());

        let ivanhoe = listings.iter().find(|l| l.book.id != book.id).unwrap();
        assert_eq!(ivanhoe.effective_price_cents, 1000);
        assert!(ivanhoe.discount.is_none());
    }

    #[tokio::test]
    async fn test_admin_edits() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = CatalogService::new(db);

        assert!(catalog.add_book(new_book("  ", 100)).await.is_err());

        let book = catalog.add_book(new_book("Kim", 900)).await.unwrap();
        assert_eq!(catalog.update_price(book.id, 1100).await.unwrap().price_cents, 1100);
        assert_eq!(catalog.update_cost(book.id, 400).await.unwrap().cost_cents, 400);
        assert_eq!(catalog.restock(book.id, 7).await.unwrap().available_quantity, 10);
        assert!(catalog.update_price(book.id, -1).await.is_err());
    }
}
