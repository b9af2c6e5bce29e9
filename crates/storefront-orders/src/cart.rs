//! # Cart Store
//!
//! One interface, two backends, selected by [`CartOwner`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Carts                                      │
//! │                                                                         │
//! │   store(CartOwner::Guest)              store(CartOwner::Account(id))    │
//! │           │                                        │                    │
//! │           ▼                                        ▼                    │
//! │   GuestCartStore                           AccountCartStore             │
//! │   JSON file, write temp + rename           carts / cart_items rows      │
//! │   carries unit price for display           cart row created lazily      │
//! │                                                                         │
//! │   merge_on_login(user_id):                                              │
//! │     for each guest line: account.add(line)   (independent per line)     │
//! │     drop merged lines from the guest file, keep failed ones for retry   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Mutation rules (quantity <= 0 removes, size limits, duplicate lines) live
//! in [`storefront_core::cart::Cart`]; both backends run every change
//! through it before persisting.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use ts_rs::TS;

use storefront_core::cart::Cart;
use storefront_core::validation::validate_id;
use storefront_core::{CartLine, CartOwner};
use storefront_db::Database;

use crate::error::{ServiceError, ServiceResult};

// =============================================================================
// Interface
// =============================================================================

#[async_trait]
pub trait CartStore: Send + Sync {
    fn owner(&self) -> CartOwner;

    async fn lines(&self) -> ServiceResult<Vec<CartLine>>;

    /// Adds copies, incrementing an existing line.
    async fn add(&self, book_id: i64, quantity: i64, unit_price_cents: Option<i64>) -> ServiceResult<()>;

    /// Sets a line's quantity. Zero or below deletes the line.
    async fn set_quantity(&self, book_id: i64, quantity: i64) -> ServiceResult<()>;

    async fn remove(&self, book_id: i64) -> ServiceResult<bool>;

    async fn clear(&self) -> ServiceResult<()>;
}

// =============================================================================
// Guest Backend
// =============================================================================

/// Guest cart kept in a local JSON file. Survives restarts.
#[derive(Debug)]
pub struct GuestCartStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl GuestCartStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        GuestCartStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> ServiceResult<Cart> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let lines: Vec<CartLine> = serde_json::from_slice(&bytes)
                    .map_err(|e| ServiceError::GuestCart(format!("corrupt cart file: {e}")))?;
                Ok(Cart::from_lines(lines)?)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Cart::new()),
            Err(e) => Err(ServiceError::GuestCart(e.to_string())),
        }
    }

    /// Writes a sibling temp file and renames it over the cart, so a crash
    /// leaves either the old or the new cart on disk.
    async fn save(&self, cart: &Cart) -> ServiceResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ServiceError::GuestCart(e.to_string()))?;
            }
        }

        let bytes = serde_json::to_vec_pretty(cart.lines())
            .map_err(|e| ServiceError::GuestCart(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| ServiceError::GuestCart(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ServiceError::GuestCart(e.to_string()))?;

        debug!(path = ?self.path, lines = cart.len(), "Guest cart saved");
        Ok(())
    }

    async fn update<T: Send>(&self, f: impl FnOnce(&mut Cart) -> ServiceResult<T> + Send) -> ServiceResult<T> {
        let _guard = self.lock.lock().await;
        let mut cart = self.load().await?;
        let out = f(&mut cart)?;
        self.save(&cart).await?;
        Ok(out)
    }

    /// Drops the given books in one write.
    pub async fn remove_many(&self, book_ids: &[i64]) -> ServiceResult<()> {
        self.update(|cart| {
            for &book_id in book_ids {
                cart.remove(book_id);
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl CartStore for GuestCartStore {
    fn owner(&self) -> CartOwner {
        CartOwner::Guest
    }

    async fn lines(&self) -> ServiceResult<Vec<CartLine>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.into_lines())
    }

    async fn add(&self, book_id: i64, quantity: i64, unit_price_cents: Option<i64>) -> ServiceResult<()> {
        validate_id("book_id", book_id)?;
        self.update(|cart| Ok(cart.add(book_id, quantity, unit_price_cents)?))
            .await
    }

    async fn set_quantity(&self, book_id: i64, quantity: i64) -> ServiceResult<()> {
        self.update(|cart| Ok(cart.set_quantity(book_id, quantity, None)?))
            .await
    }

    async fn remove(&self, book_id: i64) -> ServiceResult<bool> {
        self.update(|cart| Ok(cart.remove(book_id))).await
    }

    async fn clear(&self) -> ServiceResult<()> {
        self.update(|cart| {
            cart.clear();
            Ok(())
        })
        .await
    }
}

// =============================================================================
// Account Backend
// =============================================================================

/// Persisted cart of one account.
#[derive(Debug, Clone)]
pub struct AccountCartStore {
    db: Database,
    user_id: i64,
}

impl AccountCartStore {
    pub fn new(db: Database, user_id: i64) -> Self {
        AccountCartStore { db, user_id }
    }

    async fn current(&self) -> ServiceResult<Cart> {
        Ok(Cart::from_lines(self.db.carts().lines(self.user_id).await?)?)
    }
}

#[async_trait]
impl CartStore for AccountCartStore {
    fn owner(&self) -> CartOwner {
        CartOwner::Account(self.user_id)
    }

    async fn lines(&self) -> ServiceResult<Vec<CartLine>> {
        Ok(self.db.carts().lines(self.user_id).await?)
    }

    async fn add(&self, book_id: i64, quantity: i64, _unit_price_cents: Option<i64>) -> ServiceResult<()> {
        validate_id("book_id", book_id)?;

        // Check limits against the stored cart before writing
        let mut cart = self.current().await?;
        cart.add(book_id, quantity, None)?;

        if quantity > 0 {
            self.db.carts().add_quantity(self.user_id, book_id, quantity).await?;
        } else {
            let target = cart.get(book_id).map_or(0, |l| l.quantity);
            self.db.carts().set_quantity(self.user_id, book_id, target).await?;
        }

        debug!(user_id = self.user_id, book_id, quantity, "Account cart add");
        Ok(())
    }

    async fn set_quantity(&self, book_id: i64, quantity: i64) -> ServiceResult<()> {
        let mut cart = self.current().await?;
        cart.set_quantity(book_id, quantity, None)?;

        self.db.carts().set_quantity(self.user_id, book_id, quantity).await?;
        Ok(())
    }

    async fn remove(&self, book_id: i64) -> ServiceResult<bool> {
        Ok(self.db.carts().remove(self.user_id, book_id).await?)
    }

    async fn clear(&self) -> ServiceResult<()> {
        self.db.carts().clear(self.user_id).await?;
        Ok(())
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Outcome of merging the guest cart into an account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct MergeReport {
    /// Added to the account cart and removed from the guest cart.
    pub merged: Vec<CartLine>,
    /// Still in the guest cart.
    pub failed: Vec<CartLine>,
}

impl MergeReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Entry point for cart operations, keyed by owner.
#[derive(Debug, Clone)]
pub struct Carts {
    db: Database,
    guest: Arc<GuestCartStore>,
}

impl Carts {
    pub fn new(db: Database, guest: Arc<GuestCartStore>) -> Self {
        Carts { db, guest }
    }

    pub fn store(&self, owner: CartOwner) -> Arc<dyn CartStore> {
        match owner {
            CartOwner::Guest => self.guest.clone(),
            CartOwner::Account(user_id) => Arc::new(AccountCartStore::new(self.db.clone(), user_id)),
        }
    }

    pub async fn get(&self, owner: CartOwner) -> ServiceResult<Vec<CartLine>> {
        self.store(owner).lines().await
    }

    pub async fn add(
        &self,
        owner: CartOwner,
        book_id: i64,
        quantity: i64,
        unit_price_cents: Option<i64>,
    ) -> ServiceResult<()> {
        self.store(owner).add(book_id, quantity, unit_price_cents).await
    }

    pub async fn set_quantity(&self, owner: CartOwner, book_id: i64, quantity: i64) -> ServiceResult<()> {
        self.store(owner).set_quantity(book_id, quantity).await
    }

    pub async fn remove(&self, owner: CartOwner, book_id: i64) -> ServiceResult<bool> {
        self.store(owner).remove(book_id).await
    }

    pub async fn clear(&self, owner: CartOwner) -> ServiceResult<()> {
        self.store(owner).clear().await
    }

    /// Moves every guest line into the account cart. Quantities of books
    /// already in the account cart add up. Each line is handled on its own;
    /// lines that fail stay in the guest cart for the next attempt.
    pub async fn merge_on_login(&self, user_id: i64) -> ServiceResult<MergeReport> {
        validate_id("user_id", user_id)?;

        let guest_lines = self.guest.lines().await?;
        if guest_lines.is_empty() {
            return Ok(MergeReport::default());
        }

        let account = AccountCartStore::new(self.db.clone(), user_id);
        let mut report = MergeReport::default();

        for line in guest_lines {
            match account.add(line.book_id, line.quantity, None).await {
                Ok(()) => report.merged.push(line),
                Err(e) => {
                    warn!(user_id, book_id = line.book_id, error = %e, "Guest line not merged");
                    report.failed.push(line);
                }
            }
        }

        let merged_ids: Vec<i64> = report.merged.iter().map(|l| l.book_id).collect();
        self.guest.remove_many(&merged_ids).await?;

        info!(
            user_id,
            merged = report.merged.len(),
            failed = report.failed.len(),
            "Guest cart merged"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_core::NewBook;
    use storefront_db::DbConfig;
    use tempfile::TempDir;

    async fn setup() -> (Carts, Database, TempDir, Vec<i64>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut ids = Vec::new();
        for title in ["A", "B", "C"] {
            let book = db
                .books()
                .insert(&NewBook {
                    title: title.to_string(),
                    price_cents: 1000,
                    cost_cents: 500,
                    available_quantity: 10,
                })
                .await
                .unwrap();
            ids.push(book.id);
        }

        let dir = tempfile::tempdir().unwrap();
        let guest = Arc::new(GuestCartStore::new(dir.path().join("cart.json")));
        (Carts::new(db.clone(), guest), db, dir, ids)
    }

    fn quantities(lines: &[CartLine]) -> Vec<(i64, i64)> {
        let mut out: Vec<(i64, i64)> = lines.iter().map(|l| (l.book_id, l.quantity)).collect();
        out.sort();
        out
    }

    #[tokio::test]
    async fn test_guest_cart_persists_across_instances() {
        let (carts, _db, dir, ids) = setup().await;
        carts.add(CartOwner::Guest, ids[0], 2, Some(1000)).await.unwrap();
        carts.add(CartOwner::Guest, ids[0], 1, None).await.unwrap();

        let reopened = GuestCartStore::new(dir.path().join("cart.json"));
        let lines = reopened.lines().await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 3);
        assert_eq!(lines[0].unit_price_cents, Some(1000));
    }

    #[tokio::test]
    async fn test_zero_quantity_deletes_line() {
        let (carts, _db, _dir, ids) = setup().await;
        for owner in [CartOwner::Guest, CartOwner::Account(1)] {
            carts.set_quantity(owner, ids[1], 4).await.unwrap();
            carts.set_quantity(owner, ids[1], 0).await.unwrap();
            assert!(carts.get(owner).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_merge_adds_quantities() {
        let (carts, _db, _dir, ids) = setup().await;
        let (a, b) = (ids[0], ids[1]);

        carts.add(CartOwner::Account(7), a, 1, None).await.unwrap();
        carts.add(CartOwner::Account(7), b, 3, None).await.unwrap();
        carts.add(CartOwner::Guest, a, 2, Some(1000)).await.unwrap();

        let report = carts.merge_on_login(7).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.merged.len(), 1);

        let account = carts.get(CartOwner::Account(7)).await.unwrap();
        assert_eq!(quantities(&account), vec![(a, 3), (b, 3)]);
        assert!(carts.get(CartOwner::Guest).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_merge_of_empty_guest_cart_is_noop() {
        let (carts, _db, _dir, ids) = setup().await;
        carts.add(CartOwner::Account(7), ids[2], 2, None).await.unwrap();

        let report = carts.merge_on_login(7).await.unwrap();
        assert_eq!(report, MergeReport::default());
        assert_eq!(quantities(&carts.get(CartOwner::Account(7)).await.unwrap()), vec![(ids[2], 2)]);
    }

    #[tokio::test]
    async fn test_failed_lines_stay_in_guest_cart() {
        let (carts, _db, _dir, ids) = setup().await;
        carts.add(CartOwner::Guest, ids[0], 1, None).await.unwrap();
        // No such book: the account insert hits the foreign key
        carts.add(CartOwner::Guest, 9999, 1, None).await.unwrap();

        let report = carts.merge_on_login(3).await.unwrap();
        assert_eq!(report.merged.len(), 1);
        assert_eq!(report.failed, vec![CartLine::new(9999, 1)]);

        let guest = carts.get(CartOwner::Guest).await.unwrap();
        assert_eq!(quantities(&guest), vec![(9999, 1)]);
    }
}
