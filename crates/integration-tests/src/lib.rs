//! Behavioural tests for the Bitebox commerce session core.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bitebox-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_sync` - Optimistic, debounced cart updates and rollback
//! - `offer_redemption` - Offer flow against a scripted backend
//! - `payment_verification` - Durable verification cache
//! - `identity` - Guest id persistence and login switching
//! - `checkout` - Order placement and payment redirects
//!
//! Every test runs against [`FakeCommerceApi`], an in-memory backend that
//! records each call and can be told to fail specific operations.

#![allow(clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bitebox_core::{
    CartLine, CategoryId, CurrencyCode, GuestId, LineDisplay, LineId, OfferId, OrderId, Price,
    ProductId, SizeId,
};
use bitebox_storefront::SessionContext;
use bitebox_storefront::api::{
    ApiError, CatalogItem, CommerceApi, NewCartLine, Offer, OfferOrderRequest, OrderReceipt,
    OrderRequest, PaymentSession, PaymentSessionRequest, SizeOption, VerificationRequest,
    VerificationResponse,
};
use bitebox_storefront::config::StorefrontConfig;
use bitebox_storefront::identity::CallerIdentity;
use bitebox_storefront::storage::{MemoryStore, SharedStore};
use rust_decimal::Decimal;
use secrecy::SecretString;

// =============================================================================
// Recorded calls
// =============================================================================

/// Who a cart or order call was made as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    User,
    Guest(GuestId),
}

impl From<&CallerIdentity> for Caller {
    fn from(identity: &CallerIdentity) -> Self {
        match identity {
            CallerIdentity::Authenticated(_) => Self::User,
            CallerIdentity::Guest(id) => Self::Guest(id.clone()),
        }
    }
}

/// One call received by the fake backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FetchCart(Caller),
    AddCartLine(Caller, ProductId, u32),
    UpdateCartLine(Caller, LineId, u32),
    DeleteCartLine(Caller, LineId),
    LookupCatalog(CategoryId, SizeId),
    ListOffers,
    GetOffer(OfferId),
    CreateOfferOrder(OfferOrderRequest),
    CreateOrder { caller: Caller, items: usize },
    CreatePaymentSession(PaymentSessionRequest),
    VerifyPayment { session_id: String, guest_id: String },
}

/// Operations that can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    FetchCart,
    AddCartLine,
    UpdateCartLine,
    DeleteCartLine,
    LookupCatalog,
    GetOffer,
    CreateOfferOrder,
    CreateOrder,
    CreatePaymentSession,
    VerifyPayment,
}

/// How a failing operation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// `success: false` with this message.
    Rejected(String),
    /// Non-2xx status.
    Status(u16),
    /// The change is applied, then reported as `success: false`.
    ///
    /// Only deletes honour this; other operations fail without applying.
    AppliedButRejected(String),
}

impl Failure {
    fn to_error(&self) -> ApiError {
        match self {
            Self::Rejected(message) | Self::AppliedButRejected(message) => {
                ApiError::Rejected(message.clone())
            }
            Self::Status(status) => ApiError::Status {
                status: *status,
                message: "scripted failure".to_string(),
            },
        }
    }
}

// =============================================================================
// FakeCommerceApi
// =============================================================================

#[derive(Debug, Default)]
struct FakeState {
    cart: Vec<CartLine>,
    catalog: HashMap<(CategoryId, SizeId), Vec<CatalogItem>>,
    offers: Vec<Offer>,
    verification: Option<VerificationResponse>,
    failures: HashMap<Op, Failure>,
    failing_lines: HashMap<LineId, Failure>,
    update_delay: Option<Duration>,
    next_line_id: i32,
    next_order_id: i32,
    calls: Vec<Call>,
}

/// Scripted in-memory backend.
///
/// Cheap to clone; clones share the same backend state, so a test can keep
/// a handle while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct FakeCommerceApi {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCommerceApi {
    #[must_use]
    pub fn new() -> Self {
        let api = Self::default();
        {
            let mut state = api.state();
            state.next_line_id = 1000;
            state.next_order_id = 500;
        }
        api
    }

    /// Backend with this cart already stored.
    #[must_use]
    pub fn with_cart(lines: Vec<CartLine>) -> Self {
        let api = Self::new();
        api.state().cart = lines;
        api
    }

    pub fn set_cart(&self, lines: Vec<CartLine>) {
        self.state().cart = lines;
    }

    #[must_use]
    pub fn server_cart(&self) -> Vec<CartLine> {
        self.state().cart.clone()
    }

    #[must_use]
    pub fn server_quantity(&self, line_id: LineId) -> Option<u32> {
        self.state()
            .cart
            .iter()
            .find(|l| l.line_id == line_id)
            .map(|l| l.quantity)
    }

    pub fn add_offer(&self, offer: Offer) {
        self.state().offers.push(offer);
    }

    pub fn set_catalog(&self, category_id: CategoryId, size_id: SizeId, items: Vec<CatalogItem>) {
        self.state().catalog.insert((category_id, size_id), items);
    }

    /// Response returned by every verification call.
    pub fn set_verification(&self, response: VerificationResponse) {
        self.state().verification = Some(response);
    }

    /// Make `op` fail until [`recover`](Self::recover) is called.
    pub fn fail(&self, op: Op, failure: Failure) {
        self.state().failures.insert(op, failure);
    }

    pub fn recover(&self, op: Op) {
        self.state().failures.remove(&op);
    }

    /// Make quantity updates for one line fail.
    pub fn fail_line(&self, line_id: LineId, failure: Failure) {
        self.state().failing_lines.insert(line_id, failure);
    }

    /// Hold every quantity update for `delay` before answering.
    pub fn delay_updates(&self, delay: Duration) {
        self.state().update_delay = Some(delay);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Quantity updates received, in order.
    #[must_use]
    pub fn updates(&self) -> Vec<(LineId, u32)> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::UpdateCartLine(_, line_id, quantity) => Some((*line_id, *quantity)),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|c| matches(c)).count()
    }

    fn record(&self, call: Call) {
        self.state().calls.push(call);
    }

    fn check(&self, op: Op) -> Result<(), ApiError> {
        self.state()
            .failures
            .get(&op)
            .map_or(Ok(()), |f| Err(f.to_error()))
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommerceApi for FakeCommerceApi {
    async fn fetch_cart(&self, identity: &CallerIdentity) -> Result<Vec<CartLine>, ApiError> {
        self.record(Call::FetchCart(identity.into()));
        self.check(Op::FetchCart)?;
        Ok(self.server_cart())
    }

    async fn add_cart_line(
        &self,
        identity: &CallerIdentity,
        line: &NewCartLine,
    ) -> Result<Vec<CartLine>, ApiError> {
        self.record(Call::AddCartLine(identity.into(), line.product_id, line.quantity));
        self.check(Op::AddCartLine)?;

        let mut state = self.state();
        if let Some(existing) = state
            .cart
            .iter_mut()
            .find(|l| l.product_id == line.product_id)
        {
            existing.quantity += line.quantity;
        } else {
            state.next_line_id += 1;
            let line_id = state.next_line_id;
            state.cart.push(CartLine {
                line_id: LineId::new(line_id),
                product_id: line.product_id,
                unit_price: usd(10),
                quantity: line.quantity,
                display: LineDisplay {
                    name: format!("Product {}", line.product_id),
                    ..Default::default()
                },
            });
        }
        Ok(state.cart.clone())
    }

    async fn update_cart_line(
        &self,
        identity: &CallerIdentity,
        line_id: LineId,
        quantity: u32,
    ) -> Result<(), ApiError> {
        self.record(Call::UpdateCartLine(identity.into(), line_id, quantity));

        let delay = self.state().update_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.check(Op::UpdateCartLine)?;
        let line_failure = self.state().failing_lines.get(&line_id).cloned();
        if let Some(failure) = line_failure {
            return Err(failure.to_error());
        }

        let mut state = self.state();
        let line = state
            .cart
            .iter_mut()
            .find(|l| l.line_id == line_id)
            .ok_or_else(|| ApiError::NotFound(format!("cart line {line_id}")))?;
        line.quantity = quantity;
        Ok(())
    }

    async fn delete_cart_line(
        &self,
        identity: &CallerIdentity,
        line_id: LineId,
    ) -> Result<(), ApiError> {
        self.record(Call::DeleteCartLine(identity.into(), line_id));
        let failure = self.state().failures.get(&Op::DeleteCartLine).cloned();
        if matches!(failure, None | Some(Failure::AppliedButRejected(_))) {
            self.state().cart.retain(|l| l.line_id != line_id);
        }
        failure.map_or(Ok(()), |f| Err(f.to_error()))
    }

    async fn lookup_catalog(
        &self,
        category_id: CategoryId,
        size_id: SizeId,
    ) -> Result<Vec<CatalogItem>, ApiError> {
        self.record(Call::LookupCatalog(category_id, size_id));
        self.check(Op::LookupCatalog)?;
        Ok(self
            .state()
            .catalog
            .get(&(category_id, size_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_offers(&self) -> Result<Vec<Offer>, ApiError> {
        self.record(Call::ListOffers);
        Ok(self.state().offers.clone())
    }

    async fn get_offer(&self, offer_id: OfferId) -> Result<Offer, ApiError> {
        self.record(Call::GetOffer(offer_id));
        self.check(Op::GetOffer)?;
        self.state()
            .offers
            .iter()
            .find(|o| o.id == offer_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("Offer not found: {offer_id}")))
    }

    async fn create_offer_order(
        &self,
        _identity: &CallerIdentity,
        request: &OfferOrderRequest,
    ) -> Result<OrderId, ApiError> {
        self.record(Call::CreateOfferOrder(request.clone()));
        self.check(Op::CreateOfferOrder)?;
        let mut state = self.state();
        state.next_order_id += 1;
        Ok(OrderId::new(state.next_order_id))
    }

    async fn create_order(
        &self,
        identity: &CallerIdentity,
        request: &OrderRequest,
    ) -> Result<OrderReceipt, ApiError> {
        self.record(Call::CreateOrder {
            caller: identity.into(),
            items: request.items.len(),
        });
        self.check(Op::CreateOrder)?;
        let mut state = self.state();
        state.next_order_id += 1;
        let order_id = state.next_order_id;
        state.cart.clear();
        Ok(OrderReceipt {
            order_id: OrderId::new(order_id),
            order_number: format!("BB-{order_id}"),
        })
    }

    async fn create_payment_session(
        &self,
        request: &PaymentSessionRequest,
    ) -> Result<PaymentSession, ApiError> {
        self.record(Call::CreatePaymentSession(request.clone()));
        self.check(Op::CreatePaymentSession)?;
        Ok(PaymentSession {
            url: format!("https://pay.bitebox.test/session/{}", request.order_id),
            session_id: Some(format!("cs_{}", request.order_id)),
        })
    }

    async fn verify_payment(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationResponse, ApiError> {
        self.record(Call::VerifyPayment {
            session_id: request.session_id.clone(),
            guest_id: request.guest_id.clone(),
        });
        self.check(Op::VerifyPayment)?;
        Ok(self
            .state()
            .verification
            .clone()
            .unwrap_or_else(|| VerificationResponse {
                success: false,
                message: "Payment session not found".to_string(),
                data: None,
            }))
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Debounce window used by test sessions.
pub const DEBOUNCE: Duration = Duration::from_millis(1000);

/// A price in whole dollars.
#[must_use]
pub fn usd(amount: i64) -> Price {
    Price::new(Decimal::from(amount), CurrencyCode::USD)
}

/// A cart line.
#[must_use]
pub fn line(id: i32, price: i64, quantity: u32) -> CartLine {
    CartLine {
        line_id: LineId::new(id),
        product_id: ProductId::new(id * 10),
        unit_price: usd(price),
        quantity,
        display: LineDisplay {
            name: format!("Item {id}"),
            ..Default::default()
        },
    }
}

/// A catalog item in `category_id` and `size_id`.
#[must_use]
pub fn catalog_item(id: i32, category_id: CategoryId, size_id: SizeId) -> CatalogItem {
    CatalogItem {
        id: ProductId::new(id),
        name: format!("Pizza {id}"),
        price: Decimal::from(12),
        category_id,
        size_id,
        available: true,
        image: None,
    }
}

/// A "buy `buy` get `free` free" offer with one size.
#[must_use]
pub fn offer(id: i32, category_id: CategoryId, size_id: SizeId, buy: u32, free: u32) -> Offer {
    Offer {
        id: OfferId::new(id),
        title: format!("Buy {buy} get {free}"),
        category_id,
        buy_quantity: buy,
        free_quantity: free,
        sizes: vec![SizeOption {
            id: size_id,
            name: "Large".to_string(),
        }],
        active: true,
    }
}

/// Config for test sessions.
#[must_use]
pub fn config() -> StorefrontConfig {
    let mut config = StorefrontConfig::new("https://api.bitebox.test/api")
        .unwrap_or_else(|e| panic!("test config: {e}"));
    config.cart_debounce = DEBOUNCE;
    config
}

/// Guest session over `api` with in-memory storage.
#[must_use]
pub fn guest_session(api: &FakeCommerceApi) -> SessionContext<FakeCommerceApi> {
    session_with_store(api, config(), Arc::new(MemoryStore::new()))
}

/// Logged-in session over `api` with in-memory storage.
#[must_use]
pub fn user_session(api: &FakeCommerceApi, user_id: Option<i32>) -> SessionContext<FakeCommerceApi> {
    let mut config = config();
    config.auth_token = Some(SecretString::from("k3Jx9QmZ2pLwEr7T"));
    config.user_id = user_id.map(bitebox_core::UserId::new);
    session_with_store(api, config, Arc::new(MemoryStore::new()))
}

#[must_use]
pub fn session_with_store(
    api: &FakeCommerceApi,
    config: StorefrontConfig,
    store: SharedStore,
) -> SessionContext<FakeCommerceApi> {
    SessionContext::new(config, api.clone(), store)
}
