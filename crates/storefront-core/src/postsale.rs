//! # Post-Sale Rules
//!
//! Eligibility checks for cancellations and returns.
//!
//! ```text
//!              ┌──────────── cancellation allowed ───────────┐
//! processing ──► in_transit ──────────────────────────────────► delivered
//!                                                               │
//!                                  return allowed for window ◄──┘
//!                                  (days since order_date <= window)
//! ```
//!
//! Quantity bounds: for one book on one order, the quantities held by
//! non-rejected requests never exceed the ordered quantity.

use chrono::{DateTime, Utc};

use crate::error::Rejection;
use crate::types::{DeliveryState, Order, OrderStatus};

/// Only committed orders have post-sale workflows.
pub fn ensure_committed(order: &Order) -> Result<(), Rejection> {
    if order.status != OrderStatus::Committed {
        return Err(Rejection::OrderNotCommitted { order_id: order.id });
    }
    Ok(())
}

/// Cancellation is allowed until the order is delivered.
pub fn ensure_cancellable(order_id: i64, state: DeliveryState) -> Result<(), Rejection> {
    if state == DeliveryState::Delivered {
        return Err(Rejection::OrderAlreadyDelivered { order_id });
    }
    Ok(())
}

/// Whole days between the order and `now`, truncated.
pub fn days_since_order(order_date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - order_date).num_days()
}

/// The window is inclusive: day `window_days` is still eligible.
pub fn return_window_open(order_date: DateTime<Utc>, now: DateTime<Utc>, window_days: i64) -> bool {
    days_since_order(order_date, now) <= window_days
}

/// Returns require a delivered order inside the return window.
pub fn ensure_returnable(
    order: &Order,
    state: DeliveryState,
    now: DateTime<Utc>,
    window_days: i64,
) -> Result<(), Rejection> {
    if state != DeliveryState::Delivered {
        return Err(Rejection::OrderNotDelivered { order_id: order.id });
    }

    let elapsed_days = days_since_order(order.order_date, now);
    if elapsed_days > window_days {
        return Err(Rejection::ReturnWindowExpired {
            window_days,
            elapsed_days,
        });
    }

    Ok(())
}

/// Copies of a line not yet claimed by a return or cancellation.
pub fn remaining_quantity(ordered: i64, already_claimed: i64) -> i64 {
    (ordered - already_claimed).max(0)
}

pub fn ensure_return_quantity(requested: i64, ordered: i64, already_claimed: i64) -> Result<(), Rejection> {
    let remaining = remaining_quantity(ordered, already_claimed);
    if requested > remaining {
        return Err(Rejection::ReturnQuantityExceeded {
            requested,
            remaining,
        });
    }
    Ok(())
}

pub fn ensure_cancellation_quantity(
    requested: i64,
    ordered: i64,
    already_claimed: i64,
) -> Result<(), Rejection> {
    let remaining = remaining_quantity(ordered, already_claimed);
    if requested > remaining {
        return Err(Rejection::CancellationQuantityExceeded {
            requested,
            remaining,
        });
    }
    Ok(())
}
