//! # Error Types
//!
//! Domain-specific error types for storefront-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  storefront-core errors (this file)                                     │
//! │  ├── CoreError        - Cart and domain rule failures                   │
//! │  ├── ValidationError  - Input validation failures                       │
//! │  └── Rejection        - Post-sale business rule rejections (coded)      │
//! │                                                                         │
//! │  storefront-db errors (separate crate)                                  │
//! │  └── DbError          - Database operation failures                     │
//! │                                                                         │
//! │  storefront-orders errors                                               │
//! │  ├── ServiceError     - Cart / post-sale / admin operations             │
//! │  └── CheckoutError    - Order placement (clean vs. reconcile)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Cart has exceeded maximum allowed distinct books.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Line quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    #[error("Business rule rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before any write happens.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} must be after {after}")]
    MustBeAfter { field: String, after: String },
}

// =============================================================================
// Rejection
// =============================================================================

/// A synchronous business-rule rejection.
///
/// Each variant has a stable [`code`](Rejection::code) the UI can switch on.
/// Rejections never leave partial state behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Return window of {window_days} days has expired ({elapsed_days} days since order)")]
    ReturnWindowExpired { window_days: i64, elapsed_days: i64 },

    #[error("Return quantity {requested} exceeds remaining {remaining}")]
    ReturnQuantityExceeded { requested: i64, remaining: i64 },

    #[error("Cancellation quantity {requested} exceeds remaining {remaining}")]
    CancellationQuantityExceeded { requested: i64, remaining: i64 },

    #[error("Order {order_id} has already been delivered")]
    OrderAlreadyDelivered { order_id: i64 },

    #[error("Order {order_id} has not been delivered")]
    OrderNotDelivered { order_id: i64 },

    #[error("Order {order_id} is not committed")]
    OrderNotCommitted { order_id: i64 },

    #[error("Book {book_id} is not part of order {order_id}")]
    LineNotInOrder { order_id: i64, book_id: i64 },

    #[error("Cannot move {entity} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },
}

impl Rejection {
    /// Stable machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::ReturnWindowExpired { .. } => "return_window_expired",
            Rejection::ReturnQuantityExceeded { .. } => "return_quantity_exceeded",
            Rejection::CancellationQuantityExceeded { .. } => "cancellation_quantity_exceeded",
            Rejection::OrderAlreadyDelivered { .. } => "order_already_delivered",
            Rejection::OrderNotDelivered { .. } => "order_not_delivered",
            Rejection::OrderNotCommitted { .. } => "order_not_committed",
            Rejection::LineNotInOrder { .. } => "line_not_in_order",
            Rejection::InvalidTransition { .. } => "invalid_transition",
        }
    }

    pub fn invalid_transition(
        entity: &'static str,
        from: impl std::fmt::Debug,
        to: impl std::fmt::Debug,
    ) -> Self {
        Rejection::InvalidTransition {
            entity,
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_codes() {
        let err = Rejection::ReturnQuantityExceeded {
            requested: 3,
            remaining: 1,
        };
        assert_eq!(err.code(), "return_quantity_exceeded");
        assert_eq!(err.to_string(), "Return quantity 3 exceeds remaining 1");

        let err = Rejection::OrderAlreadyDelivered { order_id: 12 };
        assert_eq!(err.code(), "order_already_delivered");
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = Rejection::invalid_transition(
            "delivery",
            crate::types::DeliveryState::Delivered,
            crate::types::DeliveryState::Cancelled,
        );
        assert_eq!(err.to_string(), "Cannot move delivery from Delivered to Cancelled");
        assert_eq!(err.code(), "invalid_transition");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "title".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
