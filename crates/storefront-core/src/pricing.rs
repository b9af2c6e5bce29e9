//! # Pricing
//!
//! Turns cart lines plus resolved discount rates into frozen order prices.
//!
//! ```text
//! base price ──► apply_discount(rate) ──► item price (frozen on the line)
//!                                              │
//!                                              ▼ × quantity
//!                                         line subtotal ──► Σ + shipping = total
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::DiscountRate;

/// A line priced at a single instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricedLine {
    pub book_id: i64,
    pub quantity: i64,
    pub base_price: Money,
    pub rate: DiscountRate,
    /// Unit price after discount.
    pub item_price: Money,
}

impl PricedLine {
    pub fn new(book_id: i64, quantity: i64, base_price: Money, rate: DiscountRate) -> Self {
        PricedLine {
            book_id,
            quantity,
            base_price,
            rate,
            item_price: base_price.apply_discount(rate),
        }
    }

    #[inline]
    pub fn subtotal(&self) -> Money {
        self.item_price.multiply_quantity(self.quantity)
    }
}

/// Totals for a set of priced lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderQuote {
    pub lines: Vec<PricedLine>,
    pub subtotal: Money,
    pub shipping: Money,
    pub total: Money,
}

impl OrderQuote {
    /// Sums the line subtotals and adds the flat shipping charge.
    ///
    /// ```rust
    /// use storefront_core::money::Money;
    /// use storefront_core::pricing::{OrderQuote, PricedLine};
    /// use storefront_core::types::DiscountRate;
    ///
    /// let line = PricedLine::new(7, 2, Money::from_cents(2000), DiscountRate::from_percent(25));
    /// let quote = OrderQuote::new(vec![line], Money::from_cents(1000));
    /// assert_eq!(quote.total.to_string(), "$40.00");
    /// ```
    pub fn new(lines: Vec<PricedLine>, shipping: Money) -> Self {
        let subtotal: Money = lines.iter().map(PricedLine::subtotal).sum();
        OrderQuote {
            lines,
            subtotal,
            shipping,
            total: subtotal + shipping,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priced_line_without_discount() {
        let line = PricedLine::new(1, 3, Money::from_cents(1299), DiscountRate::zero());
        assert_eq!(line.item_price.cents(), 1299);
        assert_eq!(line.subtotal().cents(), 3897);
    }

    #[test]
    fn test_quote_totals() {
        let lines = vec![
            PricedLine::new(7, 2, Money::from_cents(2000), DiscountRate::from_percent(25)),
            PricedLine::new(8, 1, Money::from_cents(999), DiscountRate::zero()),
        ];
        let quote = OrderQuote::new(lines, Money::from_cents(1000));

        assert_eq!(quote.subtotal.cents(), 3000 + 999);
        assert_eq!(quote.total.cents(), 3999 + 1000);
    }

    #[test]
    fn test_empty_quote_is_shipping_only() {
        let quote = OrderQuote::new(vec![], Money::from_cents(1000));
        assert_eq!(quote.subtotal, Money::zero());
        assert_eq!(quote.total.cents(), 1000);
    }
}
