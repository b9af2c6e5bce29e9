//! # storefront-orders: Order Placement for the Storefront
//!
//! Services that keep stock, carts, orders and post-sale records consistent
//! without a transaction spanning all of them.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Storefront (wiring)                              │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Carts          │  │ CheckoutService│  │ RestockWorker          │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Guest: JSON    │  │ Validate, then │  │ Due scheduled tasks    │    │
//! │  │ file           │─►│ saga of local  │  │ Return restocks        │    │
//! │  │ Account: rows  │  │ writes with    │  │ Saga recovery          │    │
//! │  │ Merge on login │  │ compensation   │  │                        │    │
//! │  └────────────────┘  └───────┬────────┘  └────────────────────────┘    │
//! │                              │                                          │
//! │         ┌────────────────────┼─────────────────────┐                   │
//! │         ▼                    ▼                     ▼                    │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ DiscountService│  │  StockLedger   │  │ Cancellation / Return  │    │
//! │  │ resolve + admin│  │ conditional    │  │ services               │    │
//! │  │                │  │ decrement      │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  Side effects (email, invoice) go through OrderNotifier, spawned.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`app`] - `Storefront`, builds every service from one database
//! - [`cart`] - Guest and account cart stores, merge-on-login
//! - [`catalog`] - Book administration and listings
//! - [`checkout`] - Order placement saga, recovery, order queries
//! - [`config`] - TOML + environment configuration
//! - [`delivery`] - Delivery state transitions
//! - [`discounts`] - Discount resolution and administration
//! - [`error`] - Service and checkout errors
//! - [`notify`] - Post-order side effect seam
//! - [`postsale`] - Cancellation and return workflows
//! - [`stock`] - Stock ledger
//! - [`worker`] - Durable scheduled task runner
//!
//! ## Usage
//!
//! ```rust,ignore
//! use storefront_orders::{Storefront, StorefrontConfig};
//! use storefront_core::CartOwner;
//!
//! let store = Storefront::open(StorefrontConfig::load_or_default(None)).await?;
//!
//! store.carts().add(CartOwner::Account(7), book_id, 2, None).await?;
//! let placed = store.checkout().place_order(7, address_id).await?;
//! println!("Order {} total {}", placed.order.id, placed.order.total_price());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod app;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod delivery;
pub mod discounts;
pub mod error;
pub mod notify;
pub mod postsale;
pub mod stock;
pub mod worker;

// =============================================================================
// Re-exports
// =============================================================================

pub use app::Storefront;
pub use cart::{AccountCartStore, CartStore, Carts, GuestCartStore, MergeReport};
pub use catalog::CatalogService;
pub use checkout::{CheckoutService, OrderDetails, PlacedOrder, RecoveryReport};
pub use config::{ConfigError, StorefrontConfig};
pub use delivery::DeliveryService;
pub use discounts::DiscountService;
pub use error::{CheckoutError, NotifyError, SagaFailure, SagaStep, ServiceError, ServiceResult};
pub use notify::{LogNotifier, OrderNotifier};
pub use postsale::{CancellationService, RestockPayload, ReturnService};
pub use stock::StockLedger;
pub use worker::{RestockWorker, RestockWorkerHandle, WorkerPass};
