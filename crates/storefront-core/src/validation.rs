//! # Validation Module
//!
//! Input validation for the storefront.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI                                                            │
//! │  └── Basic format checks, immediate feedback                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Services (storefront-orders)                                  │
//! │  └── THIS MODULE: checked before the first write                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── CHECK (available_quantity >= 0)                                    │
//! │  ├── UNIQUE / FOREIGN KEY constraints                                   │
//! │  └── CHECK on status columns                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use storefront_core::validation::{validate_book_title, validate_quantity};
//!
//! validate_book_title("The Rust Programming Language").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Reason value that requires free-text detail in `other_reason`.
pub const OTHER_REASON: &str = "other";

const MAX_REASON_LEN: usize = 500;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a book title: non-empty, at most 300 characters.
pub fn validate_book_title(title: &str) -> ValidationResult<()> {
    validate_text("title", title, 300)
}

/// Validates a discount name: non-empty, at most 100 characters.
pub fn validate_discount_name(name: &str) -> ValidationResult<()> {
    validate_text("discount name", name, 100)
}

/// Validates a cancellation or return reason.
///
/// ## Rules
/// - `reason` is required
/// - when `reason` is `"other"`, `other_reason` is required
///
/// ```rust
/// use storefront_core::validation::validate_reason;
///
/// assert!(validate_reason("damaged", None).is_ok());
/// assert!(validate_reason("other", Some("wrong edition")).is_ok());
/// assert!(validate_reason("other", None).is_err());
/// ```
pub fn validate_reason(reason: &str, other_reason: Option<&str>) -> ValidationResult<()> {
    validate_text("reason", reason, MAX_REASON_LEN)?;

    if reason.trim().eq_ignore_ascii_case(OTHER_REASON) {
        validate_text("other reason", other_reason.unwrap_or(""), MAX_REASON_LEN)?;
    } else if let Some(other) = other_reason {
        if other.len() > MAX_REASON_LEN {
            return Err(ValidationError::TooLong {
                field: "other reason".to_string(),
                max: MAX_REASON_LEN,
            });
        }
    }

    Ok(())
}

fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price or cost in cents. Zero is allowed.
///
/// ```rust
/// use storefront_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(1099).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a discount rate: strictly between 0% and 100%.
pub fn validate_discount_bps(bps: u32) -> ValidationResult<()> {
    if bps == 0 || bps >= 10000 {
        return Err(ValidationError::OutOfRange {
            field: "discount rate".to_string(),
            min: 1,
            max: 9999,
        });
    }

    Ok(())
}

/// A discount's end, when set, must come strictly after its start.
pub fn validate_discount_window(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> ValidationResult<()> {
    match end {
        Some(end) if end <= start => Err(ValidationError::MustBeAfter {
            field: "end_date".to_string(),
            after: start.to_rfc3339(),
        }),
        _ => Ok(()),
    }
}

/// Validates an identifier supplied by an outside collaborator
/// (user id from the identity provider, address id from the UI).
pub fn validate_id(field: &str, id: i64) -> ValidationResult<()> {
    if id <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of distinct books in an order.
pub fn validate_cart_size(items: usize) -> ValidationResult<()> {
    if items > MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart items".to_string(),
            min: 1,
            max: MAX_CART_ITEMS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_book_title() {
        assert!(validate_book_title("Dune").is_ok());
        assert!(validate_book_title("   ").is_err());
        assert!(validate_book_title(&"A".repeat(301)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_discount_window() {
        let start = Utc::now();
        assert!(validate_discount_window(start, None).is_ok());
        assert!(validate_discount_window(start, Some(start + chrono::Duration::seconds(1))).is_ok());
        assert!(matches!(
            validate_discount_window(start, Some(start)),
            Err(ValidationError::MustBeAfter { .. })
        ));
        assert!(validate_discount_window(start, Some(start - chrono::Duration::days(1))).is_err());
    }

    #[test]
    fn test_validate_discount_bps() {
        assert!(validate_discount_bps(1).is_ok());
        assert!(validate_discount_bps(2500).is_ok());
        assert!(validate_discount_bps(9999).is_ok());
        assert!(validate_discount_bps(0).is_err());
        assert!(validate_discount_bps(10000).is_err());
    }

    #[test]
    fn test_validate_reason() {
        assert!(validate_reason("Other", Some("gift duplicate")).is_ok());
        assert!(validate_reason("OTHER", Some("  ")).is_err());
        assert!(validate_reason("", None).is_err());
        assert!(validate_reason("damaged", Some(&"x".repeat(501))).is_err());
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("address_id", 3).is_ok());
        assert!(validate_id("address_id", 0).is_err());
    }

    #[test]
    fn test_validate_cart_size() {
        assert!(validate_cart_size(MAX_CART_ITEMS).is_ok());
        assert!(validate_cart_size(MAX_CART_ITEMS + 1).is_err());
    }
}
