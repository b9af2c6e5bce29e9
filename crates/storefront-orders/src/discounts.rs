//! # Discount Service
//!
//! Resolution and administration of time-bounded discounts.
//!
//! ## Resolution Rule
//! ```text
//! candidates = discounts of the book where start <= at AND (end IS NULL OR end > at)
//!
//!   none         → rate 0
//!   one          → its rate
//!   several      → latest start_date wins, equal starts → highest id
//! ```
//!
//! Applying a discount ends the active ones and inserts the new one. The
//! repository does both in one transaction, but readers that run against a
//! store without that guarantee still see a single answer: a window with
//! zero active discounts resolves to 0, a window with two resolves to the
//! newer one.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use storefront_core::discount::{active_discount, resolve_rate};
use storefront_core::validation::{
    validate_discount_bps, validate_discount_name, validate_discount_window, validate_id,
};
use storefront_core::{Discount, DiscountRate, ValidationError};
use storefront_db::Database;

use crate::error::{ServiceError, ServiceResult};
use crate::notify::{spawn_discount_applied, OrderNotifier};

#[derive(Clone)]
pub struct DiscountService {
    db: Database,
    notifier: Arc<dyn OrderNotifier>,
}

impl DiscountService {
    pub fn new(db: Database, notifier: Arc<dyn OrderNotifier>) -> Self {
        DiscountService { db, notifier }
    }

    /// The single rate that applies to `book_id` at `at`.
    pub async fn resolve(&self, book_id: i64, at: DateTime<Utc>) -> ServiceResult<DiscountRate> {
        let discounts = self.db.discounts().for_book(book_id).await?;
        Ok(resolve_rate(&discounts, at))
    }

    /// The full record behind [`resolve`](Self::resolve).
    pub async fn current_discount(&self, book_id: i64, at: DateTime<Utc>) -> ServiceResult<Option<Discount>> {
        let discounts = self.db.discounts().for_book(book_id).await?;
        Ok(active_discount(&discounts, at).cloned())
    }

    /// Ends the book's active discounts and starts a new one now.
    pub async fn apply_discount(
        &self,
        book_id: i64,
        name: &str,
        rate: DiscountRate,
        end_date: Option<DateTime<Utc>>,
    ) -> ServiceResult<Discount> {
        self.apply_bulk_discount(&[book_id], name, rate, end_date).await
    }

    /// One discount linked to many books.
    pub async fn apply_bulk_discount(
        &self,
        book_ids: &[i64],
        name: &str,
        rate: DiscountRate,
        end_date: Option<DateTime<Utc>>,
    ) -> ServiceResult<Discount> {
        self.apply_bulk_discount_at(book_ids, name, rate, Utc::now(), end_date)
            .await
    }

    pub async fn apply_bulk_discount_at(
        &self,
        book_ids: &[i64],
        name: &str,
        rate: DiscountRate,
        at: DateTime<Utc>,
        end_date: Option<DateTime<Utc>>,
    ) -> ServiceResult<Discount> {
        validate_discount_name(name)?;
        validate_discount_bps(rate.bps())?;
        validate_discount_window(at, end_date)?;
        if book_ids.is_empty() {
            return Err(ValidationError::Required {
                field: "book_ids".into(),
            }
            .into());
        }
        for &book_id in book_ids {
            validate_id("book_id", book_id)?;
            self.db.books().require(book_id).await?;
        }

        let discount = self
            .db
            .discounts()
            .replace_active(book_ids, name, rate.bps(), at, end_date)
            .await?;

        info!(
            discount_id = discount.id,
            books = book_ids.len(),
            rate_bps = discount.rate_bps,
            "Discount applied"
        );

        spawn_discount_applied(self.notifier.clone(), discount.clone(), book_ids.to_vec());
        Ok(discount)
    }

    /// Ends every discount active on the book now. A discount shared with
    /// other books stays active for them. Returns how many ended.
    pub async fn end_all_active(&self, book_id: i64) -> ServiceResult<usize> {
        validate_id("book_id", book_id)?;
        let ended = self.db.discounts().end_active(book_id, Utc::now()).await?;

        info!(book_id, ended, "Active discounts ended");
        Ok(ended)
    }

    /// Ends one discount now. A discount that already ended keeps its end date.
    pub async fn expire(&self, discount_id: i64) -> ServiceResult<Discount> {
        let now = Utc::now();
        let discount = self
            .db
            .discounts()
            .get_by_id(discount_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Discount", discount_id))?;

        if matches!(discount.end_date, Some(end) if end <= now) {
            return Ok(discount);
        }

        // Not started yet: an end equal to the start means it never applies
        let end = now.max(discount.start_date);
        self.db.discounts().set_end_date(discount_id, end).await?;
        info!(discount_id, "Discount expired");

        self.db
            .discounts()
            .get_by_id(discount_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Discount", discount_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use chrono::Duration;
    use storefront_core::NewBook;
    use storefront_db::DbConfig;

    async fn setup() -> (DiscountService, Database, i64) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let book = db
            .books()
            .insert(&NewBook {
                title: "Dubliners".to_string(),
                price_cents: 2000,
                cost_cents: 900,
                available_quantity: 10,
            })
            .await
            .unwrap();
        (DiscountService::new(db.clone(), Arc::new(LogNotifier)), db, book.id)
    }

    #[tokio::test]
    async fn test_newer_discount_wins() {
        let (service, _db, book_id) = setup().await;
        let d1 = Utc::now() - Duration::days(10);
        let d2 = Utc::now() - Duration::days(2);

        service
            .apply_bulk_discount_at(&[book_id], "Spring", DiscountRate::from_percent(10), d1, None)
            .await
            .unwrap();
        let newer = service
            .apply_bulk_discount_at(&[book_id], "Flash", DiscountRate::from_percent(25), d2, None)
            .await
            .unwrap();

        assert_eq!(service.resolve(book_id, Utc::now()).await.unwrap().bps(), 2500);
        // Before the second one started, the first still applied
        assert_eq!(
            service.resolve(book_id, d1 + Duration::days(1)).await.unwrap().bps(),
            1000
        );
        assert_eq!(
            service.current_discount(book_id, Utc::now()).await.unwrap().map(|d| d.id),
            Some(newer.id)
        );
    }

    #[tokio::test]
    async fn test_end_all_and_expire() {
        let (service, _db, book_id) = setup().await;
        let start = Utc::now() - Duration::days(1);
        let discount = service
            .apply_bulk_discount_at(&[book_id], "Clearance", DiscountRate::from_percent(30), start, None)
            .await
            .unwrap();

        assert_eq!(service.end_all_active(book_id).await.unwrap(), 1);
        assert!(service.resolve(book_id, Utc::now()).await.unwrap().is_zero());
        assert_eq!(service.end_all_active(book_id).await.unwrap(), 0);

        let expired = service.expire(discount.id).await.unwrap();
        assert!(expired.end_date.is_some());
    }

    #[tokio::test]
    async fn test_single_discount_leaves_bulk_on_other_books() {
        let (service, db, a) = setup().await;
        let b = db
            .books()
            .insert(&NewBook {
                title: "Nostromo".to_string(),
                price_cents: 2000,
                cost_cents: 900,
                available_quantity: 10,
            })
            .await
            .unwrap()
            .id;
        let start = Utc::now() - Duration::days(1);

        service
            .apply_bulk_discount_at(&[a, b], "Autumn", DiscountRate::from_percent(20), start, None)
            .await
            .unwrap();
        service
            .apply_discount(a, "Half off", DiscountRate::from_percent(50), None)
            .await
            .unwrap();

        assert_eq!(service.resolve(a, Utc::now()).await.unwrap().bps(), 5000);
        assert_eq!(service.resolve(b, Utc::now()).await.unwrap().bps(), 2000);

        assert_eq!(service.end_all_active(a).await.unwrap(), 1);
        assert!(service.resolve(a, Utc::now()).await.unwrap().is_zero());
        assert_eq!(service.resolve(b, Utc::now()).await.unwrap().bps(), 2000);
    }

    #[tokio::test]
    async fn test_end_date_must_follow_start() {
        let (service, _db, book_id) = setup().await;
        service
            .apply_bulk_discount_at(
                &[book_id],
                "Standing",
                DiscountRate::from_percent(20),
                Utc::now() - Duration::days(3),
                None,
            )
            .await
            .unwrap();

        let err = service
            .apply_discount(
                book_id,
                "Stale",
                DiscountRate::from_percent(30),
                Some(Utc::now() - Duration::days(1)),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::MustBeAfter { .. })
        ));

        // Nothing was ended or inserted
        assert_eq!(service.resolve(book_id, Utc::now()).await.unwrap().bps(), 2000);
    }

    #[tokio::test]
    async fn test_expire_before_start_never_applies() {
        let (service, _db, book_id) = setup().await;
        let start = Utc::now() + Duration::days(2);
        let upcoming = service
            .apply_bulk_discount_at(&[book_id], "Launch", DiscountRate::from_percent(15), start, None)
            .await
            .unwrap();

        let expired = service.expire(upcoming.id).await.unwrap();
        assert_eq!(expired.end_date, Some(start));
        assert!(service.resolve(book_id, start).await.unwrap().is_zero());
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let (service, _db, book_id) = setup().await;

        assert!(service
            .apply_discount(book_id, "", DiscountRate::from_percent(10), None)
            .await
            .is_err());
        assert!(service
            .apply_discount(book_id, "Free", DiscountRate::from_percent(100), None)
            .await
            .is_err());
        assert!(matches!(
            service
                .apply_discount(4242, "Ghost", DiscountRate::from_percent(10), None)
                .await
                .unwrap_err(),
            ServiceError::NotFound { .. }
        ));
    }
}
