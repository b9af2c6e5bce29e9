//! # Repository Module
//!
//! Database repository implementations for the storefront.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Service (storefront-orders)                                            │
//! │       │                                                                 │
//! │       │  db.books().decrement_for_line(line_id, book_id, qty)           │
//! │       ▼                                                                 │
//! │  BookRepository                                                         │
//! │  ├── get_by_id / insert / update_price                                  │
//! │  ├── decrement_stock (conditional)                                      │
//! │  └── restore_stock                                                      │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories know SQL and nothing about business rules. Anything that
//! must be atomic (stock + journal marker, approval + restore, approval +
//! scheduled task) is a single repository call with its own transaction.
//!
//! ## Available Repositories
//!
//! - [`BookRepository`] - Catalog and stock
//! - [`DiscountRepository`] - Discounts and book links
//! - [`CartRepository`] - Account carts
//! - [`OrderRepository`] / [`DeliveryRepository`] - Orders, lines, delivery
//! - [`CancellationRepository`] / [`ReturnRepository`] - Post-sale requests
//! - [`ScheduledTaskRepository`] - Durable delayed jobs

pub mod book;
pub mod cart;
pub mod discount;
pub mod order;
pub mod postsale;
pub mod task;

pub use book::{BookRepository, StockUpdate};
pub use cart::CartRepository;
pub use discount::DiscountRepository;
pub use order::{DeliveryRepository, OrderRepository};
pub use postsale::{CancellationApproval, CancellationRepository, Claim, NewClaim, ReturnRepository};
pub use task::ScheduledTaskRepository;
