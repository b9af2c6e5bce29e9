//! # Storefront
//!
//! Wires the services to one database and configuration. Every accessor
//! builds a cheap handle; the pool and guest cart file are shared.

use std::sync::Arc;

use storefront_core::money::Money;
use storefront_db::Database;

use crate::cart::{Carts, GuestCartStore};
use crate::catalog::CatalogService;
use crate::checkout::CheckoutService;
use crate::config::StorefrontConfig;
use crate::delivery::DeliveryService;
use crate::discounts::DiscountService;
use crate::error::ServiceResult;
use crate::notify::{LogNotifier, OrderNotifier};
use crate::postsale::{CancellationService, ReturnService};
use crate::stock::StockLedger;
use crate::worker::{RestockWorker, RestockWorkerHandle};

#[derive(Clone)]
pub struct Storefront {
    db: Database,
    config: Arc<StorefrontConfig>,
    notifier: Arc<dyn OrderNotifier>,
    guest: Arc<GuestCartStore>,
}

impl Storefront {
    /// Opens the configured database and runs migrations.
    pub async fn open(config: StorefrontConfig) -> ServiceResult<Self> {
        let db = Database::new(config.database.db_config()).await?;
        Ok(Self::new(db, config))
    }

    pub fn new(db: Database, config: StorefrontConfig) -> Self {
        Self::with_notifier(db, config, Arc::new(LogNotifier))
    }

    pub fn with_notifier(db: Database, config: StorefrontConfig, notifier: Arc<dyn OrderNotifier>) -> Self {
        let guest = Arc::new(GuestCartStore::new(config.guest_cart.resolved_path()));
        Storefront {
            db,
            config: Arc::new(config),
            notifier,
            guest,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &StorefrontConfig {
        &self.config
    }

    pub fn carts(&self) -> Carts {
        Carts::new(self.db.clone(), self.guest.clone())
    }

    pub fn stock(&self) -> StockLedger {
        StockLedger::new(self.db.clone())
    }

    pub fn catalog(&self) -> CatalogService {
        CatalogService::new(self.db.clone())
    }

    pub fn discounts(&self) -> DiscountService {
        DiscountService::new(self.db.clone(), self.notifier.clone())
    }

    pub fn checkout(&self) -> CheckoutService {
        CheckoutService::new(
            self.db.clone(),
            self.carts(),
            self.notifier.clone(),
            Money::from_cents(self.config.checkout.shipping_cents),
        )
    }

    pub fn deliveries(&self) -> DeliveryService {
        DeliveryService::new(self.db.clone())
    }

    pub fn cancellations(&self) -> CancellationService {
        CancellationService::new(self.db.clone())
    }

    pub fn returns(&self) -> ReturnService {
        ReturnService::new(
            self.db.clone(),
            self.config.returns.window_days,
            self.config.returns.restock_delay(),
        )
    }

    /// A worker over the same database. Spawn `run()` on the runtime.
    pub fn restock_worker(&self) -> (RestockWorker, RestockWorkerHandle) {
        RestockWorker::new(self.db.clone(), self.config.clone(), self.returns(), self.checkout())
    }
}
