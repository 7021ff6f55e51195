//! Bitebox REST API boundary.
//!
//! # Architecture
//!
//! - [`CommerceApi`] is the seam every component talks to; the backend is the
//!   source of truth for carts, catalog, offers, orders and payments
//! - [`RestClient`] is the `reqwest` implementation
//! - Catalog lookups and offers are cached in memory via `moka`
//!   (5 minute TTL by default); carts and orders are never cached
//!
//! Authenticated calls carry a bearer token; guest calls are scoped by the
//! `guestId` query parameter.

mod cache;
mod client;
mod conversions;
pub mod types;

use std::future::Future;

use bitebox_core::{CartLine, CategoryId, LineId, OfferId, OrderId, SizeId};
use thiserror::Error;

pub use client::RestClient;
pub use types::*;

use crate::identity::CallerIdentity;

/// Errors that can occur when talking to the Bitebox API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Status { status: u16, message: String },

    /// The API answered `success: false`; the message is the backend's own.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the API.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// An endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ApiError {
    /// Whether this failure points at the backend or the network rather than
    /// at the shopper's request.
    #[must_use]
    pub const fn is_server_side(&self) -> bool {
        match self {
            Self::Http(_) | Self::Parse(_) | Self::InvalidUrl(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Rejected(_) | Self::NotFound(_) | Self::RateLimited(_) => false,
        }
    }
}

/// Remote operations consumed by the session core.
///
/// Methods return `impl Future + Send` so engines can drive them from
/// spawned tasks without an `async-trait` dependency.
pub trait CommerceApi: Clone + Send + Sync + 'static {
    /// Fetch the authoritative cart for `identity`.
    fn fetch_cart(
        &self,
        identity: &CallerIdentity,
    ) -> impl Future<Output = Result<Vec<CartLine>, ApiError>> + Send;

    /// Add a product to the cart; returns the updated cart.
    fn add_cart_line(
        &self,
        identity: &CallerIdentity,
        line: &NewCartLine,
    ) -> impl Future<Output = Result<Vec<CartLine>, ApiError>> + Send;

    /// Set one line's quantity.
    fn update_cart_line(
        &self,
        identity: &CallerIdentity,
        line_id: LineId,
        quantity: u32,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Delete one line.
    fn delete_cart_line(
        &self,
        identity: &CallerIdentity,
        line_id: LineId,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Purchasable items in a category and size.
    fn lookup_catalog(
        &self,
        category_id: CategoryId,
        size_id: SizeId,
    ) -> impl Future<Output = Result<Vec<CatalogItem>, ApiError>> + Send;

    /// All offers currently published.
    fn list_offers(&self) -> impl Future<Output = Result<Vec<Offer>, ApiError>> + Send;

    /// One offer by id.
    fn get_offer(&self, offer_id: OfferId)
    -> impl Future<Output = Result<Offer, ApiError>> + Send;

    /// Create an order from a redeemed offer.
    fn create_offer_order(
        &self,
        identity: &CallerIdentity,
        request: &OfferOrderRequest,
    ) -> impl Future<Output = Result<OrderId, ApiError>> + Send;

    /// Create an order from the cart (authenticated or guest variant).
    fn create_order(
        &self,
        identity: &CallerIdentity,
        request: &OrderRequest,
    ) -> impl Future<Output = Result<OrderReceipt, ApiError>> + Send;

    /// Create an external payment session for a guest order.
    fn create_payment_session(
        &self,
        request: &PaymentSessionRequest,
    ) -> impl Future<Output = Result<PaymentSession, ApiError>> + Send;

    /// Verify an external payment session.
    ///
    /// A `success: false` body is returned as `Ok`, not as an error.
    fn verify_payment(
        &self,
        request: &VerificationRequest,
    ) -> impl Future<Output = Result<VerificationResponse, ApiError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::Status {
            status: 503,
            message: "maintenance".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 503 - maintenance");

        let err = ApiError::RateLimited(60);
        assert_eq!(err.to_string(), "Rate limited, retry after 60 seconds");
    }

    #[test]
    fn test_server_side_classification() {
        assert!(
            ApiError::Status {
                status: 500,
                message: String::new()
            }
            .is_server_side()
        );
        assert!(
            !ApiError::Status {
                status: 409,
                message: String::new()
            }
            .is_server_side()
        );
        assert!(!ApiError::Rejected("sold out".to_string()).is_server_side());
    }
}
