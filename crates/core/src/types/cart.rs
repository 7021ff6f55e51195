//! Cart line types.

use serde::{Deserialize, Serialize};

use super::id::{LineId, ProductId};
use super::price::{CurrencyCode, Price};

/// One product line in the shopper's cart.
///
/// `quantity` is always at least 1; a line that would reach 0 is removed
/// instead. The line total is derived from the unit price on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub line_id: LineId,
    pub product_id: ProductId,
    pub unit_price: Price,
    pub quantity: u32,
    pub display: LineDisplay,
}

impl CartLine {
    /// `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// Presentation-only data carried alongside a cart line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDisplay {
    pub name: String,
    pub size: Option<String>,
    pub image_url: Option<String>,
}

/// Totals derived from the cart lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartTotals {
    pub grand_total: Price,
    pub item_count: u32,
}

impl CartTotals {
    /// Sum line totals and quantities.
    ///
    /// An empty cart totals zero in the default currency.
    #[must_use]
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a CartLine>) -> Self {
        let mut lines = lines.into_iter().peekable();
        let currency = lines
            .peek()
            .map_or_else(CurrencyCode::default, |l| l.unit_price.currency_code);

        lines.fold(
            Self {
                grand_total: Price::zero(currency),
                item_count: 0,
            },
            |acc, line| Self {
                grand_total: acc.grand_total + line.line_total(),
                item_count: acc.item_count.saturating_add(line.quantity),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn line(id: i32, price: i64, quantity: u32) -> CartLine {
        CartLine {
            line_id: LineId::new(id),
            product_id: ProductId::new(id * 10),
            unit_price: Price::new(Decimal::from(price), CurrencyCode::USD),
            quantity,
            display: LineDisplay::default(),
        }
    }

    #[test]
    fn test_line_total_is_derived() {
        let mut l = line(1, 10, 1);
        assert_eq!(l.line_total().amount, Decimal::from(10));
        l.quantity = 3;
        assert_eq!(l.line_total().amount, Decimal::from(30));
    }

    #[test]
    fn test_totals() {
        let lines = [line(1, 10, 3), line(2, 4, 2)];
        let totals = CartTotals::from_lines(&lines);
        assert_eq!(totals.grand_total.amount, Decimal::from(38));
        assert_eq!(totals.item_count, 5);
    }

    #[test]
    fn test_totals_empty() {
        let totals = CartTotals::from_lines(&Vec::<CartLine>::new());
        assert_eq!(totals.grand_total, Price::zero(CurrencyCode::USD));
        assert_eq!(totals.item_count, 0);
    }
}
