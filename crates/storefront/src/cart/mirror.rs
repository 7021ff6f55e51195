//! Local copy of the authoritative cart.

use bitebox_core::{CartLine, CartTotals, LineId};

/// Ordered local copy of the cart, as last loaded plus optimistic edits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartMirror {
    lines: Vec<CartLine>,
}

impl CartMirror {
    /// Replace every line.
    pub fn replace(&mut self, lines: Vec<CartLine>) {
        self.lines = lines;
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn get(&self, line_id: LineId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.line_id == line_id)
    }

    #[must_use]
    pub fn quantity(&self, line_id: LineId) -> Option<u32> {
        self.get(line_id).map(|l| l.quantity)
    }

    #[must_use]
    pub fn contains(&self, line_id: LineId) -> bool {
        self.get(line_id).is_some()
    }

    /// Set a line's quantity, clamped to at least 1. Returns the previous
    /// quantity, or `None` if the line is not in the mirror.
    pub fn set_quantity(&mut self, line_id: LineId, quantity: u32) -> Option<u32> {
        let line = self.lines.iter_mut().find(|l| l.line_id == line_id)?;
        let previous = line.quantity;
        line.quantity = quantity.max(1);
        Some(previous)
    }

    pub fn remove(&mut self, line_id: LineId) -> Option<CartLine> {
        let index = self.lines.iter().position(|l| l.line_id == line_id)?;
        Some(self.lines.remove(index))
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    #[must_use]
    pub fn totals(&self) -> CartTotals {
        CartTotals::from_lines(&self.lines)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bitebox_core::{CurrencyCode, LineDisplay, Price, ProductId};
    use rust_decimal::Decimal;

    use super::*;

    fn line(id: i32, price: i64, quantity: u32) -> CartLine {
        CartLine {
            line_id: LineId::new(id),
            product_id: ProductId::new(id),
            unit_price: Price::new(Decimal::from(price), CurrencyCode::USD),
            quantity,
            display: LineDisplay::default(),
        }
    }

    #[test]
    fn test_set_quantity_clamps_and_reports_previous() {
        let mut mirror = CartMirror::default();
        mirror.replace(vec![line(1, 10, 2)]);

        assert_eq!(mirror.set_quantity(LineId::new(1), 0), Some(2));
        assert_eq!(mirror.quantity(LineId::new(1)), Some(1));
        assert_eq!(mirror.set_quantity(LineId::new(9), 3), None);
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut mirror = CartMirror::default();
        mirror.replace(vec![line(1, 10, 1), line(2, 5, 1), line(3, 1, 1)]);

        assert!(mirror.remove(LineId::new(2)).is_some());
        let ids: Vec<i32> = mirror.lines().iter().map(|l| l.line_id.as_i32()).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(mirror.remove(LineId::new(2)).is_none());
    }

    #[test]
    fn test_totals_follow_edits() {
        let mut mirror = CartMirror::default();
        mirror.replace(vec![line(1, 10, 1), line(2, 4, 2)]);
        mirror.set_quantity(LineId::new(1), 3);

        let totals = mirror.totals();
        assert_eq!(totals.grand_total.amount, Decimal::from(38));
        assert_eq!(totals.item_count, 5);
    }
}
