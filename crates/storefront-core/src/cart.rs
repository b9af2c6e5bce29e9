//! # Cart Math
//!
//! In-memory cart operations shared by both cart backends.
//!
//! The guest backend loads a [`Cart`], mutates it with these methods and
//! writes it back. The account backend applies the same rules in SQL.
//!
//! ## Rules
//! - One line per book
//! - Quantity is always >= 1; setting it to 0 or below deletes the line
//! - `add` increments an existing line
//! - At most [`MAX_CART_ITEMS`] distinct books, at most
//!   [`MAX_ITEM_QUANTITY`] copies per line

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::CartLine;
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Cart::default()
    }

    /// Builds a cart from stored lines, normalising duplicates and
    /// non-positive quantities.
    pub fn from_lines(lines: Vec<CartLine>) -> CoreResult<Self> {
        Ok(Cart {
            lines: normalize_lines(lines)?,
        })
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<CartLine> {
        self.lines
    }

    pub fn get(&self, book_id: i64) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.book_id == book_id)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Adds `quantity` copies, incrementing an existing line.
    pub fn add(&mut self, book_id: i64, quantity: i64, unit_price_cents: Option<i64>) -> CoreResult<()> {
        let current = self.get(book_id).map_or(0, |l| l.quantity);
        let total = current
            .checked_add(quantity)
            .ok_or(CoreError::QuantityTooLarge {
                requested: quantity,
                max: MAX_ITEM_QUANTITY,
            })?;
        self.set_quantity(book_id, total, unit_price_cents)
    }

    /// Sets a line's quantity. Zero or below removes the line.
    ///
    /// A `None` price keeps whatever price the line already carried.
    pub fn set_quantity(
        &mut self,
        book_id: i64,
        quantity: i64,
        unit_price_cents: Option<i64>,
    ) -> CoreResult<()> {
        if quantity <= 0 {
            self.remove(book_id);
            return Ok(());
        }

        if quantity > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: quantity,
                max: MAX_ITEM_QUANTITY,
            });
        }

        match self.lines.iter_mut().find(|l| l.book_id == book_id) {
            Some(line) => {
                line.quantity = quantity;
                if unit_price_cents.is_some() {
                    line.unit_price_cents = unit_price_cents;
                }
            }
            None => {
                if self.lines.len() >= MAX_CART_ITEMS {
                    return Err(CoreError::CartTooLarge {
                        max: MAX_CART_ITEMS,
                    });
                }
                self.lines.push(CartLine {
                    book_id,
                    quantity,
                    unit_price_cents,
                });
            }
        }

        Ok(())
    }

    /// Removes a line. Returns whether it existed.
    pub fn remove(&mut self, book_id: i64) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.book_id != book_id);
        self.lines.len() != before
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

/// Collapses duplicate books into one line (quantities add, first position
/// kept) and drops lines with quantity <= 0.
pub fn normalize_lines(lines: Vec<CartLine>) -> CoreResult<Vec<CartLine>> {
    let mut out: Vec<CartLine> = Vec::with_capacity(lines.len());
    for line in lines {
        match out.iter_mut().find(|l| l.book_id == line.book_id) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(line.quantity)
                    .ok_or(CoreError::QuantityTooLarge {
                        requested: line.quantity,
                        max: MAX_ITEM_QUANTITY,
                    })?;
                if existing.unit_price_cents.is_none() {
                    existing.unit_price_cents = line.unit_price_cents;
                }
            }
            None => out.push(line),
        }
    }
    out.retain(|l| l.quantity > 0);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_increments_existing_line() {
        let mut cart = Cart::new();
        cart.add(1, 2, Some(1500)).unwrap();
        cart.add(1, 3, None).unwrap();

        assert_eq!(cart.len(), 1);
        let line = cart.get(1).unwrap();
        assert_eq!(line.quantity, 5);
        assert_eq!(line.unit_price_cents, Some(1500));
    }

    #[test]
    fn test_set_quantity_zero_deletes() {
        let mut cart = Cart::new();
        cart.add(1, 2, None).unwrap();
        cart.set_quantity(1, 0, None).unwrap();
        assert!(cart.is_empty());

        cart.add(2, 2, None).unwrap();
        cart.set_quantity(2, -4, None).unwrap();
        assert!(cart.get(2).is_none());
    }

    #[test]
    fn test_quantity_limit() {
        let mut cart = Cart::new();
        let err = cart.set_quantity(1, MAX_ITEM_QUANTITY + 1, None).unwrap_err();
        assert!(matches!(err, CoreError::QuantityTooLarge { .. }));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_cart_size_limit() {
        let mut cart = Cart::new();
        for book in 0..MAX_CART_ITEMS as i64 {
            cart.add(book, 1, None).unwrap();
        }
        let err = cart.add(10_000, 1, None).unwrap_err();
        assert!(matches!(err, CoreError::CartTooLarge { .. }));

        // Existing lines can still change
        cart.add(0, 1, None).unwrap();
        assert_eq!(cart.get(0).unwrap().quantity, 2);
    }

    #[test]
    fn test_normalize_lines() {
        let lines = vec![
            CartLine::new(3, 1),
            CartLine::new(5, 2),
            CartLine::new(3, 4),
            CartLine::new(9, 0),
        ];
        let normalized = normalize_lines(lines).unwrap();
        assert_eq!(normalized, vec![CartLine::new(3, 5), CartLine::new(5, 2)]);
    }

    #[test]
    fn test_overflowing_quantities_are_rejected() {
        let err = normalize_lines(vec![CartLine::new(3, i64::MAX), CartLine::new(3, 1)]).unwrap_err();
        assert!(matches!(err, CoreError::QuantityTooLarge { .. }));

        let mut cart = Cart::from_lines(vec![CartLine::new(1, 5)]).unwrap();
        let err = cart.add(1, i64::MAX, None).unwrap_err();
        assert!(matches!(err, CoreError::QuantityTooLarge { .. }));
        assert_eq!(cart.get(1).map(|l| l.quantity), Some(5));
    }

    #[test]
    fn test_remove_reports_existence() {
        let mut cart = Cart::from_lines(vec![CartLine::new(1, 1)]).unwrap();
        assert!(cart.remove(1));
        assert!(!cart.remove(1));
    }
}
