//! # Domain Types
//!
//! Core domain types used throughout the storefront.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Book       │◄──│    Discount     │   │    CartLine     │       │
//! │  │  ─────────────  │ * │  ─────────────  │   │  ─────────────  │       │
//! │  │  price_cents    │   │  rate_bps       │   │  book_id        │       │
//! │  │  cost_cents     │   │  start_date     │   │  quantity       │       │
//! │  │  available_qty  │   │  end_date?      │   │  unit_price?    │       │
//! │  └────────┬────────┘   └─────────────────┘   └─────────────────┘       │
//! │           │                                                             │
//! │  ┌────────▼────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    OrderLine    │──►│      Order      │◄──│ DeliveryStatus  │       │
//! │  │  item_price     │   │  total_price    │ 1 │ processing ...  │       │
//! │  │  (frozen)       │   │  status (saga)  │   └─────────────────┘       │
//! │  └─────────────────┘   └────────┬────────┘                              │
//! │                                 │                                       │
//! │                    ┌────────────┴────────────┐                          │
//! │           ┌────────▼────────┐      ┌─────────▼───────┐                  │
//! │           │  Cancellation   │      │  ReturnRequest  │                  │
//! │           │  pending/...    │      │  pending/...    │                  │
//! │           └─────────────────┘      └─────────────────┘                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Row ids are SQLite integer keys. Scheduled tasks use UUID v4 strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Discount Rate
// =============================================================================

/// Discount rate in basis points (2500 = 25%).
///
/// A valid discount record has `0 < bps < 10000`; zero is used as the
/// "no discount applies" result of resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiscountRate(u32);

impl DiscountRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        DiscountRate(bps)
    }

    /// Creates a rate from a whole percentage (25 → 2500 bps).
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        DiscountRate(pct * 100)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        DiscountRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for DiscountRate {
    fn default() -> Self {
        DiscountRate::zero()
    }
}

// =============================================================================
// Book
// =============================================================================

/// A book in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Book {
    pub id: i64,

    pub title: String,

    /// Base unit price in cents, before any discount.
    pub price_cents: i64,

    /// Purchase cost in cents (margin reporting).
    pub cost_cents: i64,

    /// Copies on hand. Never negative.
    pub available_quantity: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Book {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }

    /// Checks if the requested quantity is on hand right now.
    pub fn can_fulfil(&self, quantity: i64) -> bool {
        self.available_quantity >= quantity
    }
}

/// Admin input for adding a book to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewBook {
    pub title: String,
    pub price_cents: i64,
    pub cost_cents: i64,
    pub available_quantity: i64,
}

// =============================================================================
// Discount
// =============================================================================

/// A time-bounded percentage discount. Linked to books through
/// the `book_discounts` join table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Discount {
    pub id: i64,
    pub name: String,
    pub rate_bps: u32,
    #[ts(as = "String")]
    pub start_date: DateTime<Utc>,
    /// `None` means open-ended.
    #[ts(as = "Option<String>")]
    pub end_date: Option<DateTime<Utc>>,
}

impl Discount {
    #[inline]
    pub fn rate(&self) -> DiscountRate {
        DiscountRate::from_bps(self.rate_bps)
    }

    /// Active when `start_date <= at` and the end (if any) is after `at`.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.start_date <= at && self.end_date.map_or(true, |end| end > at)
    }
}

/// A book together with the discount that currently applies to it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BookListing {
    pub book: Book,
    pub discount: Option<Discount>,
    /// Unit price after the resolved discount.
    pub effective_price_cents: i64,
}

// =============================================================================
// Cart
// =============================================================================

/// Who a cart belongs to.
///
/// The guest cart lives in client-local storage and has no owner id.
/// An account cart is persisted and keyed by the user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum CartOwner {
    Guest,
    Account(i64),
}

impl CartOwner {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            CartOwner::Guest => None,
            CartOwner::Account(id) => Some(*id),
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, CartOwner::Guest)
    }
}

impl std::fmt::Display for CartOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CartOwner::Guest => write!(f, "guest"),
            CartOwner::Account(id) => write!(f, "account:{}", id),
        }
    }
}

/// A `(book, quantity)` pair in a cart. Quantity is always >= 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CartLine {
    pub book_id: i64,
    pub quantity: i64,
    /// Unit price captured at add-time. Guest carts only, display only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price_cents: Option<i64>,
}

impl CartLine {
    pub fn new(book_id: i64, quantity: i64) -> Self {
        CartLine {
            book_id,
            quantity,
            unit_price_cents: None,
        }
    }

    pub fn with_unit_price(mut self, cents: i64) -> Self {
        self.unit_price_cents = Some(cents);
        self
    }
}

// =============================================================================
// Order
// =============================================================================

/// Saga progress of an order.
///
/// ```text
/// pending ──► committed
///    │
///    └──────► failed   (stock restored, no delivery)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order row written, later saga steps not yet confirmed.
    Pending,
    /// Every saga step completed.
    Committed,
    /// Compensated after a failed step.
    Failed,
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

/// A placed order. Totals are fixed at creation and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub address_id: i64,
    #[ts(as = "String")]
    pub order_date: DateTime<Utc>,
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    /// Σ line subtotals + shipping.
    pub total_price_cents: i64,
    pub status: OrderStatus,
    pub failure_reason: Option<String>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn total_price(&self) -> Money {
        Money::from_cents(self.total_price_cents)
    }
}

/// A line of an order with its price frozen at placement time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderLine {
    pub id: i64,
    pub order_id: i64,
    pub book_id: i64,
    pub quantity: i64,
    /// Book price at placement (frozen).
    pub base_price_cents: i64,
    /// Discount applied at placement (frozen).
    pub discount_rate_bps: u32,
    /// Unit price after discount (frozen).
    pub item_price_cents: i64,
    /// Set in the same transaction as the stock decrement for this line.
    pub stock_decremented: bool,
}

impl OrderLine {
    #[inline]
    pub fn item_price(&self) -> Money {
        Money::from_cents(self.item_price_cents)
    }

    #[inline]
    pub fn subtotal(&self) -> Money {
        self.item_price().multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Delivery
// =============================================================================

/// Delivery progress of a committed order.
///
/// ```text
/// processing ──► in_transit ──► delivered
///      │              │
///      └──────────────┴──────► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Processing,
    InTransit,
    Delivered,
    Cancelled,
}

impl DeliveryState {
    pub fn can_transition_to(&self, next: DeliveryState) -> bool {
        use DeliveryState::*;
        matches!(
            (self, next),
            (Processing, InTransit)
                | (InTransit, Delivered)
                | (Processing, Cancelled)
                | (InTransit, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryState::Delivered | DeliveryState::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryState::Processing => "processing",
            DeliveryState::InTransit => "in_transit",
            DeliveryState::Delivered => "delivered",
            DeliveryState::Cancelled => "cancelled",
        }
    }
}

/// One-to-one with an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DeliveryStatus {
    pub order_id: i64,
    pub state: DeliveryState,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Post-Sale
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CancellationStatus {
    Pending,
    Approved,
    Rejected,
}

/// A customer request to cancel part of an order before delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Cancellation {
    pub id: i64,
    pub order_id: i64,
    pub book_id: i64,
    pub quantity: i64,
    pub reason: String,
    pub other_reason: Option<String>,
    pub status: CancellationStatus,
    #[ts(as = "String")]
    pub requested_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub decided_at: Option<DateTime<Utc>>,
}

/// Return lifecycle. Stock comes back only at `returned`.
///
/// ```text
/// pending ──► approved ──► returned
///    │
///    └──────► rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Pending,
    Approved,
    Rejected,
    Returned,
}

impl ReturnStatus {
    /// Statuses whose quantity counts against the ordered quantity.
    pub fn holds_quantity(&self) -> bool {
        !matches!(self, ReturnStatus::Rejected)
    }
}

/// A customer request to send back copies after delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ReturnRequest {
    pub id: i64,
    pub order_id: i64,
    pub book_id: i64,
    pub quantity: i64,
    /// Copied from the order line at request time.
    pub item_price_cents: i64,
    pub reason: String,
    pub other_reason: Option<String>,
    pub status: ReturnStatus,
    #[ts(as = "String")]
    pub request_date: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub decided_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub returned_at: Option<DateTime<Utc>>,
}

impl ReturnRequest {
    /// Amount owed back to the customer for this request.
    pub fn refund_amount(&self) -> Money {
        Money::from_cents(self.item_price_cents).multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Stock
// =============================================================================

/// One line that cannot be fulfilled from current stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockShortfall {
    pub book_id: i64,
    pub requested: i64,
    pub available: i64,
}

// =============================================================================
// Scheduled Tasks
// =============================================================================

/// Kinds of deferred work executed by the background worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Move an approved return to `returned` and put its copies back.
    ReturnRestock,
}

/// A durable delayed job. Survives restarts; polled by due time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ScheduledTask {
    pub id: String,
    pub kind: TaskKind,
    /// JSON payload, shape depends on `kind`.
    pub payload: String,
    /// Unix milliseconds.
    pub due_at_ms: i64,
    pub attempts: i64,
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub attempted_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================
