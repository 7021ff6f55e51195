//! Wire and domain types for the Bitebox REST API.
//!
//! Field names follow the backend's camelCase JSON. Types that leave the API
//! layer (offers, catalog items, verification payloads) are plain domain
//! types; cart lines are converted into [`bitebox_core::CartLine`] in
//! `conversions`.

use bitebox_core::{
    CategoryId, CurrencyCode, GuestId, LineId, OfferId, OrderId, PaymentMethod, PaymentStatus,
    Price, ProductId, SizeId, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Envelope
// =============================================================================

/// Response envelope used by every endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

// =============================================================================
// Cart Types
// =============================================================================

/// Cart payload returned by the cart endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartPayload {
    #[serde(default)]
    pub items: Vec<CartLineDto>,
    #[serde(default)]
    pub currency: Option<CurrencyCode>,
}

/// A cart line as the backend sends it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineDto {
    pub id: LineId,
    pub product_id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// Body for adding a product to the cart.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCartLine {
    pub product_id: ProductId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_id: Option<SizeId>,
    pub quantity: u32,
}

/// Body for changing a line's quantity.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QuantityUpdate {
    pub quantity: u32,
}

// =============================================================================
// Catalog Types
// =============================================================================

/// A purchasable menu item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub category_id: CategoryId,
    pub size_id: SizeId,
    #[serde(default = "default_true")]
    pub available: bool,
    #[serde(default)]
    pub image: Option<String>,
}

impl CatalogItem {
    /// Price in the store currency.
    #[must_use]
    pub fn unit_price(&self) -> Price {
        Price::new(self.price, CurrencyCode::default())
    }
}

const fn default_true() -> bool {
    true
}

// =============================================================================
// Offer Types
// =============================================================================

/// A size an offer can be redeemed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeOption {
    pub id: SizeId,
    pub name: String,
}

/// A "buy B get F free" promotion scoped to one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: OfferId,
    pub title: String,
    pub category_id: CategoryId,
    /// Items the shopper must buy (B).
    pub buy_quantity: u32,
    /// Items the shopper gets free (F).
    pub free_quantity: u32,
    #[serde(default)]
    pub sizes: Vec<SizeOption>,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Body for creating an order from a redeemed offer.
///
/// Exactly one of `user_id` and `guest_id` is set; build it with
/// [`OfferOrderRequest::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferOrderRequest {
    pub offer_id: OfferId,
    pub buy_item_ids: Vec<ProductId>,
    pub free_item_ids: Vec<ProductId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_id: Option<GuestId>,
}

impl OfferOrderRequest {
    /// Build a request owned by `owner`.
    #[must_use]
    pub fn new(
        offer_id: OfferId,
        buy_item_ids: Vec<ProductId>,
        free_item_ids: Vec<ProductId>,
        owner: crate::identity::OrderOwner,
    ) -> Self {
        let (user_id, guest_id) = match owner {
            crate::identity::OrderOwner::User(id) => (Some(id), None),
            crate::identity::OrderOwner::Guest(id) => (None, Some(id)),
        };
        Self {
            offer_id,
            buy_item_ids,
            free_item_ids,
            user_id,
            guest_id,
        }
    }
}

/// Response of the order-from-offer endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferOrderResponse {
    pub success: bool,
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub message: Option<String>,
}

// =============================================================================
// Checkout Types
// =============================================================================

/// Delivery and payment details entered at checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutDetails {
    pub customer_name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub delivery_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub payment_method: PaymentMethod,
}

/// One line of an order request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub line_id: LineId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Body for the order-creation endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    #[serde(flatten)]
    pub details: CheckoutDetails,
    pub items: Vec<OrderItem>,
}

/// Reference to a created order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    pub order_id: OrderId,
    pub order_number: String,
}

/// Body for creating an external payment session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSessionRequest {
    pub order_id: OrderId,
    pub guest_id: GuestId,
}

/// An external payment page to redirect the shopper to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub url: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

// =============================================================================
// Payment Verification Types
// =============================================================================

/// Body for the payment verification endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub session_id: String,
    pub guest_id: String,
}

/// Payment verification outcome as reported by the backend.
///
/// `success: false` is a normal outcome, not a transport error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<VerifiedPayment>,
}

/// Details of a verified payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedPayment {
    pub order_id: OrderId,
    pub order_number: String,
    pub payment_status: PaymentStatus,
    pub total_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::identity::OrderOwner;

    #[test]
    fn test_offer_order_request_has_exactly_one_owner() {
        let guest = GuestId::parse("ABCDEFGHIJKLMNOP").unwrap();
        let req = OfferOrderRequest::new(
            OfferId::new(3),
            vec![ProductId::new(1), ProductId::new(1)],
            vec![ProductId::new(2)],
            OrderOwner::Guest(guest),
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["guestId"], "ABCDEFGHIJKLMNOP");
        assert!(json.get("userId").is_none());
        assert_eq!(json["buyItemIds"], serde_json::json!([1, 1]));

        let req = OfferOrderRequest::new(
            OfferId::new(3),
            vec![],
            vec![],
            OrderOwner::User(UserId::new(8)),
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["userId"], 8);
        assert!(json.get("guestId").is_none());
    }

    #[test]
    fn test_envelope_without_data() {
        let env: Envelope<CartPayload> =
            serde_json::from_str(r#"{"success":false,"message":"Line not found"}"#).unwrap();
        assert!(!env.success);
        assert!(env.data.is_none());
        assert_eq!(env.message.as_deref(), Some("Line not found"));
    }

    #[test]
    fn test_envelope_payload_need_not_be_default() {
        let env: Envelope<OrderReceipt> = serde_json::from_str(
            r#"{"success":true,"data":{"orderId":9,"orderNumber":"BB-9"}}"#,
        )
        .unwrap();
        assert_eq!(env.data.unwrap().order_id, OrderId::new(9));

        let env: Envelope<OrderReceipt> = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(env.data.is_none());
    }

    #[test]
    fn test_verification_response_parses_numbers_as_decimal() {
        let body = r#"{
            "success": true,
            "message": "Payment verified",
            "data": {
                "orderId": 77,
                "orderNumber": "BB-1001",
                "paymentStatus": "paid",
                "totalAmount": 42.5
            }
        }"#;
        let resp: VerificationResponse = serde_json::from_str(body).unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.total_amount, Decimal::new(425, 1));
        assert!(data.payment_status.is_paid());
        assert!(data.customer_email.is_none());
    }

    #[test]
    fn test_order_request_flattens_details() {
        let req = OrderRequest {
            details: CheckoutDetails {
                customer_name: "Ana".to_string(),
                phone: "555-0100".to_string(),
                delivery_address: "1 Main St".to_string(),
                payment_method: PaymentMethod::Online,
                ..Default::default()
            },
            items: vec![OrderItem {
                line_id: LineId::new(1),
                product_id: ProductId::new(10),
                quantity: 2,
            }],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["customerName"], "Ana");
        assert_eq!(json["paymentMethod"], "online");
        assert_eq!(json["items"][0]["quantity"], 2);
    }
}
