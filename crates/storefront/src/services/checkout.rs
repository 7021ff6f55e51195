//! Cart checkout.

use std::sync::Arc;

use bitebox_core::{CartLine, OrderId, PaymentMethod};
use tracing::{info, instrument, warn};

use crate::api::{CheckoutDetails, CommerceApi, OrderItem, OrderRequest, PaymentSessionRequest};
use crate::error::{Result, SessionError, add_breadcrumb};
use crate::identity::{CallerIdentity, IdentityResolver};

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPlacement {
    pub order_id: OrderId,
    pub order_number: String,
    /// External payment page, for guests paying online.
    pub redirect_url: Option<String>,
}

/// Places orders for the resolved caller.
pub struct CheckoutService<A> {
    api: A,
    identity: Arc<IdentityResolver>,
}

impl<A> std::fmt::Debug for CheckoutService<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutService").finish_non_exhaustive()
    }
}

impl<A: CommerceApi> CheckoutService<A> {
    #[must_use]
    pub const fn new(api: A, identity: Arc<IdentityResolver>) -> Self {
        Self { api, identity }
    }

    /// Place an order for `lines`.
    ///
    /// Guests paying online also get a payment session; its URL is returned
    /// as [`OrderPlacement::redirect_url`].
    ///
    /// # Errors
    ///
    /// Returns `Validation` without contacting the backend for an empty cart
    /// or missing contact details, and `Fetch` if a backend call failed.
    #[instrument(skip_all, fields(lines = lines.len(), method = %details.payment_method))]
    pub async fn place_order(
        &self,
        details: &CheckoutDetails,
        lines: &[CartLine],
    ) -> Result<OrderPlacement> {
        validate(details, lines)?;

        let request = OrderRequest {
            details: details.clone(),
            items: lines
                .iter()
                .map(|line| OrderItem {
                    line_id: line.line_id,
                    product_id: line.product_id,
                    quantity: line.quantity,
                })
                .collect(),
        };

        let identity = self.identity.resolve();
        let receipt = self.api.create_order(&identity, &request).await?;
        info!(
            order_id = %receipt.order_id,
            order_number = %receipt.order_number,
            "Order placed"
        );
        add_breadcrumb(
            "checkout",
            "Placed order",
            Some(&[("order_id", receipt.order_id.to_string().as_str())]),
        );

        let redirect_url = match (&identity, details.payment_method) {
            (CallerIdentity::Guest(guest_id), PaymentMethod::Online) => {
                let session = self
                    .api
                    .create_payment_session(&PaymentSessionRequest {
                        order_id: receipt.order_id,
                        guest_id: guest_id.clone(),
                    })
                    .await
                    .inspect_err(|e| {
                        warn!(
                            order_id = %receipt.order_id,
                            error = %e,
                            "Order placed but payment session could not be created"
                        );
                    })?;
                Some(session.url)
            }
            _ => None,
        };

        Ok(OrderPlacement {
            order_id: receipt.order_id,
            order_number: receipt.order_number,
            redirect_url,
        })
    }
}

fn validate(details: &CheckoutDetails, lines: &[CartLine]) -> Result<()> {
    if lines.is_empty() {
        return Err(SessionError::Validation("Your cart is empty".to_string()));
    }

    let missing: Vec<&str> = [
        ("name", &details.customer_name),
        ("phone", &details.phone),
        ("delivery address", &details.delivery_address),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(field, _)| field)
    .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SessionError::Validation(format!(
            "Please enter your {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use bitebox_core::{CurrencyCode, LineDisplay, LineId, Price, ProductId};
    use rust_decimal::Decimal;

    use super::*;

    fn details() -> CheckoutDetails {
        CheckoutDetails {
            customer_name: "Ana".to_string(),
            phone: "555-0100".to_string(),
            delivery_address: "1 Main St".to_string(),
            ..Default::default()
        }
    }

    fn lines() -> Vec<CartLine> {
        vec![CartLine {
            line_id: LineId::new(1),
            product_id: ProductId::new(10),
            unit_price: Price::new(Decimal::from(10), CurrencyCode::USD),
            quantity: 1,
            display: LineDisplay::default(),
        }]
    }

    #[test]
    fn test_validate_accepts_complete_details() {
        assert!(validate(&details(), &lines()).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_cart() {
        assert!(matches!(
            validate(&details(), &[]),
            Err(SessionError::Validation(ref m)) if m == "Your cart is empty"
        ));
    }

    #[test]
    fn test_validate_lists_blank_fields() {
        let mut d = details();
        d.phone = "  ".to_string();
        d.delivery_address = String::new();
        assert!(matches!(
            validate(&d, &lines()),
            Err(SessionError::Validation(ref m)) if m == "Please enter your phone, delivery address"
        ));
    }
}
