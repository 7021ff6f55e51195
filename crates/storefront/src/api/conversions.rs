//! Wire-to-domain conversions.

use bitebox_core::{CartLine, CurrencyCode, LineDisplay, Price};
use tracing::warn;

use super::types::{CartLineDto, CartPayload};

/// Convert a cart payload into cart lines.
///
/// Lines with a zero quantity violate the cart invariant and are dropped.
pub fn convert_cart(payload: CartPayload) -> Vec<CartLine> {
    let currency = payload.currency.unwrap_or_default();
    payload
        .items
        .into_iter()
        .filter_map(|dto| convert_cart_line(dto, currency))
        .collect()
}

fn convert_cart_line(dto: CartLineDto, currency: CurrencyCode) -> Option<CartLine> {
    if dto.quantity == 0 {
        warn!(line_id = %dto.id, "Dropping cart line with zero quantity");
        return None;
    }

    Some(CartLine {
        line_id: dto.id,
        product_id: dto.product_id,
        unit_price: Price::new(dto.price, currency),
        quantity: dto.quantity,
        display: LineDisplay {
            name: dto.name,
            size: dto.size,
            image_url: dto.image,
        },
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_convert_cart_drops_zero_quantity() {
        let payload: CartPayload = serde_json::from_str(
            r#"{
                "currency": "EUR",
                "items": [
                    {"id": 1, "productId": 10, "name": "Margherita", "price": 10, "quantity": 1, "size": "Large"},
                    {"id": 2, "productId": 11, "name": "Cola", "price": "2.50", "quantity": 0}
                ]
            }"#,
        )
        .unwrap();

        let lines = convert_cart(payload);
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line.unit_price, Price::new(Decimal::from(10), CurrencyCode::EUR));
        assert_eq!(line.display.size.as_deref(), Some("Large"));
    }
}
