//! # Service Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Service Error Categories                            │
//! │                                                                         │
//! │  ServiceError (carts, stock, admin, post-sale)                          │
//! │  ├── Rejected(Rejection)       business rule, coded, nothing written    │
//! │  ├── Validation / CartLimit    bad input, nothing written               │
//! │  ├── InsufficientStock         conditional decrement refused            │
//! │  └── Database / GuestCart      infrastructure                           │
//! │                                                                         │
//! │  CheckoutError (order placement)                                        │
//! │  ├── clean rejections          EmptyCart, Validation, BookNotFound,     │
//! │  │                             InsufficientStock, Database (pre-write)  │
//! │  └── SagaFailed(SagaFailure)   an order row exists: reconcile           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use ts_rs::TS;

use storefront_core::{CoreError, Rejection, StockShortfall, ValidationError};
use storefront_db::DbError;

/// Result type alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

// =============================================================================
// Service Error
// =============================================================================

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Cart size or line quantity limits.
    #[error("{0}")]
    CartLimit(CoreError),

    #[error("Insufficient stock for book {}: requested {}, available {}", .0.book_id, .0.requested, .0.available)]
    InsufficientStock(StockShortfall),

    #[error("Guest cart storage failed: {0}")]
    GuestCart(String),

    #[error("Invalid task payload: {0}")]
    InvalidPayload(String),

    #[error("Worker channel closed")]
    WorkerStopped,

    #[error("Database error: {0}")]
    Database(DbError),
}

impl ServiceError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        ServiceError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// The business rule that refused the operation, if any.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            ServiceError::Rejected(r) => Some(r),
            _ => None,
        }
    }

    /// Stable reason code for rejections, `None` for everything else.
    pub fn code(&self) -> Option<&'static str> {
        self.rejection().map(Rejection::code)
    }
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ServiceError::NotFound { entity, id },
            other => ServiceError::Database(other),
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Rejected(r) => ServiceError::Rejected(r),
            CoreError::Validation(v) => ServiceError::Validation(v),
            other => ServiceError::CartLimit(other),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::InvalidPayload(err.to_string())
    }
}

// =============================================================================
// Checkout Error
// =============================================================================

/// The saga step that failed after the order row was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SagaStep {
    DecrementStock,
    OpenDelivery,
    Commit,
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SagaStep::DecrementStock => write!(f, "decrement_stock"),
            SagaStep::OpenDelivery => write!(f, "open_delivery"),
            SagaStep::Commit => write!(f, "commit"),
        }
    }
}

/// Everything an operator needs to reconcile a partially applied order.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct SagaFailure {
    pub order_id: i64,
    pub step: SagaStep,
    /// Books whose step failed.
    pub affected_books: Vec<i64>,
    /// Lines the conditional decrement refused (a race since validation).
    pub shortfalls: Vec<StockShortfall>,
    /// True when every decremented line was restored and the order marked `failed`.
    pub compensated: bool,
    pub reason: String,
}

/// Order placement outcome when no order was produced.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    CartLimit(CoreError),

    #[error("Book {0} not found")]
    BookNotFound(i64),

    /// Every line that cannot be fulfilled, not just the first.
    #[error("Insufficient stock for {} book(s)", .0.len())]
    InsufficientStock(Vec<StockShortfall>),

    /// Failed before any write.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Order {} failed at {}: {}", .0.order_id, .0.step, .0.reason)]
    SagaFailed(SagaFailure),
}

impl CheckoutError {
    /// Nothing was written.
    pub fn is_clean_rejection(&self) -> bool {
        !matches!(self, CheckoutError::SagaFailed(_))
    }

    /// An order row exists and compensation did not fully succeed.
    pub fn needs_reconciliation(&self) -> bool {
        matches!(self, CheckoutError::SagaFailed(f) if !f.compensated)
    }

    /// Id of the order left behind, if one was created.
    pub fn order_id(&self) -> Option<i64> {
        match self {
            CheckoutError::SagaFailed(f) => Some(f.order_id),
            _ => None,
        }
    }
}

impl From<CoreError> for CheckoutError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => CheckoutError::Validation(v),
            other => CheckoutError::CartLimit(other),
        }
    }
}

impl From<ServiceError> for CheckoutError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(v) => CheckoutError::Validation(v),
            ServiceError::CartLimit(c) => CheckoutError::CartLimit(c),
            ServiceError::Database(db) => CheckoutError::Database(db),
            ServiceError::NotFound { entity, id } => {
                CheckoutError::Database(DbError::NotFound { entity, id })
            }
            other => CheckoutError::Database(DbError::Internal(other.to_string())),
        }
    }
}

// =============================================================================
// Notification Error
// =============================================================================

/// A best-effort side effect failed. Logged, never propagated.
#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_not_found_maps_to_not_found() {
        let err: ServiceError = DbError::not_found("Book", 7).into();
        assert!(matches!(err, ServiceError::NotFound { ref entity, ref id } if entity == "Book" && id == "7"));
    }

    #[test]
    fn test_rejection_code_passthrough() {
        let err: ServiceError = Rejection::OrderAlreadyDelivered { order_id: 3 }.into();
        assert_eq!(err.code(), Some("order_already_delivered"));
        assert_eq!(ServiceError::GuestCart("x".into()).code(), None);
    }

    #[test]
    fn test_checkout_error_classification() {
        let clean = CheckoutError::InsufficientStock(vec![StockShortfall {
            book_id: 1,
            requested: 5,
            available: 2,
        }]);
        assert!(clean.is_clean_rejection());
        assert!(!clean.needs_reconciliation());
        assert_eq!(clean.order_id(), None);

        let failure = SagaFailure {
            order_id: 9,
            step: SagaStep::DecrementStock,
            affected_books: vec![1],
            shortfalls: vec![],
            compensated: false,
            reason: "boom".into(),
        };
        let partial = CheckoutError::SagaFailed(failure.clone());
        assert!(!partial.is_clean_rejection());
        assert!(partial.needs_reconciliation());
        assert_eq!(partial.order_id(), Some(9));
        assert_eq!(partial.to_string(), "Order 9 failed at decrement_stock: boom");

        let compensated = CheckoutError::SagaFailed(SagaFailure {
            compensated: true,
            ..failure
        });
        assert!(!compensated.is_clean_rejection());
        assert!(!compensated.needs_reconciliation());
    }
}
