//! # Discount Resolver
//!
//! Picks the single discount that applies to a book at a given instant.
//!
//! ## Resolution Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Candidates: every discount linked to the book                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Keep where  start_date <= at  AND  (end_date is None OR end_date > at) │
//! │       │                                                                 │
//! │       ├── none left        → rate 0                                     │
//! │       │                                                                 │
//! │       └── one or more      → latest start_date wins                     │
//! │                              equal start_date → highest id wins         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Applying a new discount ends the active ones and then inserts the new
//! record as two separate writes. Between them a reader may see zero or two
//! active discounts. The tie-break above makes the two-active case resolve
//! to the newest record, so the answer never depends on which write a
//! reader happened to observe first.
//!
//! The clock is a parameter: callers pass `at`, this module never reads it.

use chrono::{DateTime, Utc};

use crate::types::{Discount, DiscountRate};

/// Returns the discount in effect at `at`, if any.
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use storefront_core::discount::active_discount;
/// use storefront_core::types::Discount;
///
/// let d = |id, rate_bps, day| Discount {
///     id,
///     name: format!("d{id}"),
///     rate_bps,
///     start_date: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
///     end_date: None,
/// };
/// let discounts = vec![d(1, 1000, 1), d(2, 2500, 5)];
/// let now = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap();
///
/// assert_eq!(active_discount(&discounts, now).map(|d| d.id), Some(2));
/// ```
pub fn active_discount(discounts: &[Discount], at: DateTime<Utc>) -> Option<&Discount> {
    discounts
        .iter()
        .filter(|d| d.is_active_at(at))
        .max_by(|a, b| a.start_date.cmp(&b.start_date).then(a.id.cmp(&b.id)))
}

/// Returns the rate in effect at `at`, or zero.
pub fn resolve_rate(discounts: &[Discount], at: DateTime<Utc>) -> DiscountRate {
    active_discount(discounts, at)
        .map(Discount::rate)
        .unwrap_or_default()
}

/// Discounts that are active at `at`. Used when ending them before a new one
/// is applied.
pub fn active_discounts(discounts: &[Discount], at: DateTime<Utc>) -> Vec<&Discount> {
    discounts.iter().filter(|d| d.is_active_at(at)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, 9, 0, 0).unwrap()
    }

    fn discount(id: i64, rate_bps: u32, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Discount {
        Discount {
            id,
            name: format!("discount-{id}"),
            rate_bps,
            start_date: start,
            end_date: end,
        }
    }

    #[test]
    fn test_no_discounts_resolves_to_zero() {
        assert_eq!(resolve_rate(&[], day(1)), DiscountRate::zero());
    }

    #[test]
    fn test_later_start_wins() {
        let discounts = vec![
            discount(1, 1000, day(1), None),
            discount(2, 2500, day(5), None),
        ];

        // Any instant at or after the second start picks the second
        for d in 5..=20 {
            assert_eq!(resolve_rate(&discounts, day(d)).bps(), 2500);
        }
        // Before it, only the first is active
        assert_eq!(resolve_rate(&discounts, day(3)).bps(), 1000);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let a = discount(1, 1000, day(1), None);
        let b = discount(2, 2500, day(5), None);

        let forward = vec![a.clone(), b.clone()];
        let backward = vec![b, a];
        assert_eq!(
            resolve_rate(&forward, day(10)),
            resolve_rate(&backward, day(10))
        );
    }

    #[test]
    fn test_equal_start_breaks_by_highest_id() {
        let discounts = vec![
            discount(9, 1500, day(2), None),
            discount(4, 3000, day(2), None),
        ];
        assert_eq!(active_discount(&discounts, day(3)).map(|d| d.id), Some(9));
    }

    #[test]
    fn test_expired_discount_ignored() {
        let discounts = vec![discount(1, 5000, day(1), Some(day(4)))];
        assert_eq!(resolve_rate(&discounts, day(4)), DiscountRate::zero());
        assert_eq!(resolve_rate(&discounts, day(3)).bps(), 5000);
    }

    #[test]
    fn test_future_discount_ignored() {
        let discounts = vec![discount(1, 5000, day(10), None)];
        assert_eq!(resolve_rate(&discounts, day(9)), DiscountRate::zero());
    }

    #[test]
    fn test_transient_double_active_window() {
        // Old one not yet ended, new one already inserted
        let now = day(6);
        let discounts = vec![
            discount(1, 1000, day(1), None),
            discount(2, 2000, now, None),
        ];
        assert_eq!(resolve_rate(&discounts, now).bps(), 2000);
        assert_eq!(active_discounts(&discounts, now).len(), 2);
    }

    #[test]
    fn test_transient_zero_active_window() {
        // Old one ended, new one not yet inserted
        let now = day(6);
        let discounts = vec![discount(1, 1000, day(1), Some(now))];
        assert_eq!(resolve_rate(&discounts, now), DiscountRate::zero());
        assert_eq!(
            resolve_rate(&discounts, now - Duration::milliseconds(1)).bps(),
            1000
        );
    }
}
