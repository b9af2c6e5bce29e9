//! # storefront-core: Pure Business Logic for the Storefront
//!
//! This crate holds the rules of the bookstore as pure functions with zero
//! I/O dependencies. The clock is always a parameter.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Storefront Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    UI layer (out of scope)                      │   │
//! │  │    Catalog ──► Cart ──► Checkout ──► Orders ──► Returns         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 storefront-orders (services)                    │   │
//! │  │    Carts, CheckoutService, post-sale services, worker           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ storefront-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐           │   │
//! │  │   │  types   │ │ discount │ │ pricing  │ │ postsale │           │   │
//! │  │   │  money   │ │ resolver │ │  quotes  │ │  rules   │           │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────┘           │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 storefront-db (Database Layer)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Book, Discount, Order, Return, ...)
//! - [`money`] - Money type with integer arithmetic
//! - [`discount`] - Discount Resolver (latest start wins)
//! - [`pricing`] - Frozen line prices and order totals
//! - [`cart`] - Cart math shared by both cart backends
//! - [`postsale`] - Cancellation and return eligibility
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use storefront_core::money::Money;
//! use storefront_core::pricing::{OrderQuote, PricedLine};
//! use storefront_core::types::DiscountRate;
//!
//! let line = PricedLine::new(7, 2, Money::from_cents(2000), DiscountRate::from_percent(25));
//! assert_eq!(line.item_price.cents(), 1500);
//!
//! let quote = OrderQuote::new(vec![line], Money::from_cents(storefront_core::DEFAULT_SHIPPING_CENTS));
//! assert_eq!(quote.total.cents(), 4000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod discount;
pub mod error;
pub mod money;
pub mod postsale;
pub mod pricing;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, Rejection, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct books in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum copies of a single book in a cart line.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Days after `order_date` during which a return can be requested.
pub const RETURN_WINDOW_DAYS: i64 = 30;

/// Flat shipping charge added to every order ($10.00).
pub const DEFAULT_SHIPPING_CENTS: i64 = 1000;
