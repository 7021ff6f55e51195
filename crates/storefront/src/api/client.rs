//! `reqwest` implementation of [`CommerceApi`].

use std::sync::Arc;

use bitebox_core::{CartLine, CategoryId, LineId, OfferId, OrderId, SizeId};
use moka::future::Cache;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use super::cache::{CacheKey, CacheValue};
use super::conversions::convert_cart;
use super::types::{
    CartPayload, CatalogItem, Envelope, NewCartLine, Offer, OfferOrderRequest, OfferOrderResponse,
    OrderReceipt, OrderRequest, PaymentSession, PaymentSessionRequest, QuantityUpdate,
    VerificationRequest, VerificationResponse,
};
use super::{ApiError, CommerceApi};
use crate::config::ApiConfig;
use crate::identity::CallerIdentity;

/// How much of an unexpected response body to keep in logs and errors.
const BODY_PREVIEW_CHARS: usize = 500;

// =============================================================================
// RestClient
// =============================================================================

/// Client for the Bitebox REST API.
///
/// Cheap to clone; clones share the HTTP connection pool and cache.
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<RestClientInner>,
}

struct RestClientInner {
    client: reqwest::Client,
    base_url: Url,
    cache: Cache<CacheKey, CacheValue>,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.inner.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl RestClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(config.cache_ttl)
            .build();

        Ok(Self {
            inner: Arc::new(RestClientInner {
                client,
                base_url: config.base_url.clone(),
                cache,
            }),
        })
    }

    /// Build an endpoint URL, adding the `guestId` parameter for guests.
    fn url(&self, path: &str, identity: Option<&CallerIdentity>) -> Result<Url, ApiError> {
        let mut url = self.inner.base_url.join(path)?;
        if let Some(CallerIdentity::Guest(guest_id)) = identity {
            url.query_pairs_mut()
                .append_pair("guestId", guest_id.as_str());
        }
        Ok(url)
    }

    /// Path of a cart resource for the given identity.
    fn cart_path(identity: &CallerIdentity, line_id: Option<LineId>) -> String {
        let base = if identity.is_authenticated() {
            "cart"
        } else {
            "guest/cart"
        };
        match line_id {
            Some(id) => format!("{base}/{id}"),
            None => base.to_string(),
        }
    }

    /// Start a request, attaching the bearer token for authenticated callers.
    fn request(&self, method: Method, url: Url, identity: Option<&CallerIdentity>) -> RequestBuilder {
        let builder = self.inner.client.request(method, url);
        match identity {
            Some(CallerIdentity::Authenticated(session)) => {
                builder.bearer_auth(session.token.expose_secret())
            }
            _ => builder,
        }
    }

    /// Send a request and return the status and raw body.
    async fn send(&self, request: RequestBuilder) -> Result<(StatusCode, String), ApiError> {
        let response = request.send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ApiError::RateLimited(retry_after));
        }

        let body = response.text().await?;
        Ok((status, body))
    }

    /// Send a request and decode the response envelope.
    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Envelope<T>, ApiError> {
        let (status, body) = self.send(request).await?;

        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        parse_body(&body)
    }

    /// Cache lookup helper.
    async fn cached(&self, key: &CacheKey) -> Option<CacheValue> {
        let hit = self.inner.cache.get(key).await;
        if hit.is_some() {
            debug!(?key, "Cache hit");
        }
        hit
    }
}

/// Build a status error, preferring the backend's own message.
fn status_error(status: StatusCode, body: &str) -> ApiError {
    if status == StatusCode::NOT_FOUND {
        return ApiError::NotFound(envelope_message(body).unwrap_or_else(|| "resource".to_string()));
    }

    tracing::warn!(
        status = %status,
        body = %preview(body),
        "Bitebox API returned non-success status"
    );

    ApiError::Status {
        status: status.as_u16(),
        message: envelope_message(body).unwrap_or_else(|| preview(body)),
    }
}

fn envelope_message(body: &str) -> Option<String> {
    serde_json::from_str::<Envelope<serde_json::Value>>(body)
        .ok()
        .and_then(|env| env.message)
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %preview(body),
            "Failed to parse Bitebox API response"
        );
        ApiError::Parse(e)
    })
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}

/// Unwrap an envelope that must carry data.
fn into_data<T>(envelope: Envelope<T>, what: &str) -> Result<T, ApiError> {
    if !envelope.success {
        return Err(rejected(envelope.message));
    }
    envelope
        .data
        .ok_or_else(|| ApiError::NotFound(format!("{what} missing from response")))
}

/// Check an envelope whose data the caller does not need.
fn ensure_success<T>(envelope: Envelope<T>) -> Result<(), ApiError> {
    if envelope.success {
        Ok(())
    } else {
        Err(rejected(envelope.message))
    }
}

fn rejected(message: Option<String>) -> ApiError {
    ApiError::Rejected(message.unwrap_or_else(|| "Request was rejected".to_string()))
}

// =============================================================================
// CommerceApi
// =============================================================================

impl CommerceApi for RestClient {
    #[instrument(skip(self, identity), fields(authenticated = identity.is_authenticated()))]
    async fn fetch_cart(&self, identity: &CallerIdentity) -> Result<Vec<CartLine>, ApiError> {
        let url = self.url(&Self::cart_path(identity, None), Some(identity))?;
        let envelope: Envelope<CartPayload> = self
            .execute(self.request(Method::GET, url, Some(identity)))
            .await?;

        Ok(convert_cart(into_data(envelope, "cart")?))
    }

    #[instrument(skip(self, identity), fields(product_id = %line.product_id))]
    async fn add_cart_line(
        &self,
        identity: &CallerIdentity,
        line: &NewCartLine,
    ) -> Result<Vec<CartLine>, ApiError> {
        let url = self.url(&Self::cart_path(identity, None), Some(identity))?;
        let envelope: Envelope<CartPayload> = self
            .execute(self.request(Method::POST, url, Some(identity)).json(line))
            .await?;

        Ok(convert_cart(into_data(envelope, "cart")?))
    }

    #[instrument(skip(self, identity))]
    async fn update_cart_line(
        &self,
        identity: &CallerIdentity,
        line_id: LineId,
        quantity: u32,
    ) -> Result<(), ApiError> {
        let url = self.url(&Self::cart_path(identity, Some(line_id)), Some(identity))?;
        let envelope: Envelope<serde_json::Value> = self
            .execute(
                self.request(Method::PUT, url, Some(identity))
                    .json(&QuantityUpdate { quantity }),
            )
            .await?;

        ensure_success(envelope)
    }

    #[instrument(skip(self, identity))]
    async fn delete_cart_line(
        &self,
        identity: &CallerIdentity,
        line_id: LineId,
    ) -> Result<(), ApiError> {
        let url = self.url(&Self::cart_path(identity, Some(line_id)), Some(identity))?;
        let envelope: Envelope<serde_json::Value> = self
            .execute(self.request(Method::DELETE, url, Some(identity)))
            .await?;

        ensure_success(envelope)
    }

    #[instrument(skip(self))]
    async fn lookup_catalog(
        &self,
        category_id: CategoryId,
        size_id: SizeId,
    ) -> Result<Vec<CatalogItem>, ApiError> {
        let cache_key = CacheKey::Catalog {
            category_id,
            size_id,
        };

        if let Some(CacheValue::Catalog(items)) = self.cached(&cache_key).await {
            return Ok(items);
        }

        let mut url = self.url("products", None)?;
        url.query_pairs_mut()
            .append_pair("category", &category_id.to_string())
            .append_pair("size", &size_id.to_string());

        let envelope: Envelope<Vec<CatalogItem>> =
            self.execute(self.request(Method::GET, url, None)).await?;
        let items = into_data(envelope, "products")?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Catalog(items.clone()))
            .await;

        Ok(items)
    }

    #[instrument(skip(self))]
    async fn list_offers(&self) -> Result<Vec<Offer>, ApiError> {
        if let Some(CacheValue::Offers(offers)) = self.cached(&CacheKey::Offers).await {
            return Ok(offers);
        }

        let url = self.url("offers", None)?;
        let envelope: Envelope<Vec<Offer>> =
            self.execute(self.request(Method::GET, url, None)).await?;
        let offers = into_data(envelope, "offers")?;

        self.inner
            .cache
            .insert(CacheKey::Offers, CacheValue::Offers(offers.clone()))
            .await;

        Ok(offers)
    }

    #[instrument(skip(self))]
    async fn get_offer(&self, offer_id: OfferId) -> Result<Offer, ApiError> {
        let cache_key = CacheKey::Offer(offer_id);

        if let Some(CacheValue::Offer(offer)) = self.cached(&cache_key).await {
            return Ok(*offer);
        }

        let url = self.url(&format!("offers/{offer_id}"), None)?;
        let envelope: Envelope<Offer> = self
            .execute(self.request(Method::GET, url, None))
            .await
            .map_err(|e| match e {
                ApiError::NotFound(_) => ApiError::NotFound(format!("Offer not found: {offer_id}")),
                other => other,
            })?;
        let offer = into_data(envelope, "offer")?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Offer(Box::new(offer.clone())))
            .await;

        Ok(offer)
    }

    #[instrument(skip(self, identity, request), fields(offer_id = %request.offer_id))]
    async fn create_offer_order(
        &self,
        identity: &CallerIdentity,
        request: &OfferOrderRequest,
    ) -> Result<OrderId, ApiError> {
        let url = self.url("orders/offer", None)?;
        let (status, body) = self
            .send(self.request(Method::POST, url, Some(identity)).json(request))
            .await?;

        // Rejections arrive as `success: false`, sometimes with a 4xx status.
        let response: OfferOrderResponse = if status.is_success() {
            parse_body(&body)?
        } else {
            serde_json::from_str(&body).map_err(|_| status_error(status, &body))?
        };

        match (response.success, response.order_id) {
            (true, Some(order_id)) => Ok(order_id),
            (true, None) => Err(ApiError::NotFound("orderId missing from response".to_string())),
            (false, _) => Err(rejected(response.message)),
        }
    }

    #[instrument(skip(self, identity, request), fields(authenticated = identity.is_authenticated()))]
    async fn create_order(
        &self,
        identity: &CallerIdentity,
        request: &OrderRequest,
    ) -> Result<OrderReceipt, ApiError> {
        let path = if identity.is_authenticated() {
            "orders"
        } else {
            "guest/orders"
        };
        let url = self.url(path, Some(identity))?;
        let envelope: Envelope<OrderReceipt> = self
            .execute(self.request(Method::POST, url, Some(identity)).json(request))
            .await?;

        into_data(envelope, "order")
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_payment_session(
        &self,
        request: &PaymentSessionRequest,
    ) -> Result<PaymentSession, ApiError> {
        let url = self.url("payments/session", None)?;
        let envelope: Envelope<PaymentSession> = self
            .execute(self.request(Method::POST, url, None).json(request))
            .await?;

        into_data(envelope, "payment session")
    }

    #[instrument(skip(self, request), fields(session_id = %request.session_id))]
    async fn verify_payment(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationResponse, ApiError> {
        let url = self.url("payments/verify", None)?;
        let (status, body) = self
            .send(self.request(Method::POST, url, None).json(request))
            .await?;

        if status.is_success() {
            return parse_body(&body);
        }

        // A failed verification is still a verification result.
        serde_json::from_str::<VerificationResponse>(&body).map_err(|_| status_error(status, &body))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use bitebox_core::{GuestId, UserId};
    use secrecy::SecretString;

    use super::*;
    use crate::identity::AuthSession;

    fn client() -> RestClient {
        RestClient::new(&ApiConfig {
            base_url: Url::parse("https://api.bitebox.test/api/").unwrap(),
            timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(300),
        })
        .unwrap()
    }

    fn guest() -> CallerIdentity {
        CallerIdentity::Guest(GuestId::parse("ABCDEFGHIJKLMNOP").unwrap())
    }

    fn user() -> CallerIdentity {
        CallerIdentity::Authenticated(AuthSession::new(
            SecretString::from("tok"),
            Some(UserId::new(1)),
        ))
    }

    #[test]
    fn test_guest_urls_carry_guest_id() {
        let client = client();
        let identity = guest();
        let url = client
            .url(&RestClient::cart_path(&identity, Some(LineId::new(4))), Some(&identity))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.bitebox.test/api/guest/cart/4?guestId=ABCDEFGHIJKLMNOP"
        );
    }

    #[test]
    fn test_authenticated_urls_have_no_guest_id() {
        let client = client();
        let identity = user();
        let url = client
            .url(&RestClient::cart_path(&identity, None), Some(&identity))
            .unwrap();
        assert_eq!(url.as_str(), "https://api.bitebox.test/api/cart");
    }

    #[test]
    fn test_status_error_prefers_envelope_message() {
        let err = status_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"success":false,"message":"Quantity exceeds stock"}"#,
        );
        assert!(matches!(
            err,
            ApiError::Status { status: 422, ref message } if message == "Quantity exceeds stock"
        ));

        let err = status_error(StatusCode::NOT_FOUND, "<html>nope</html>");
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_into_data_rejection_keeps_message() {
        let env: Envelope<OrderReceipt> = Envelope {
            success: false,
            message: Some("Restaurant is closed".to_string()),
            data: None,
        };
        assert!(matches!(
            into_data(env, "order"),
            Err(ApiError::Rejected(ref m)) if m == "Restaurant is closed"
        ));
    }
}
