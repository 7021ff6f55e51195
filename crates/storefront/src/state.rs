//! Session context shared by every component.

use std::sync::Arc;

use bitebox_core::{OfferId, UserId};
use secrecy::SecretString;
use tracing::{info, instrument, warn};

use crate::api::{ApiError, CheckoutDetails, CommerceApi, Offer, RestClient};
use crate::cart::CartEngine;
use crate::config::StorefrontConfig;
use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::identity::{AuthSession, IdentityResolver};
use crate::offer::OfferFlow;
use crate::services::{CheckoutService, OrderPlacement, PaymentVerifier};
use crate::storage::{FileStore, MemoryStore, SharedStore};

/// One shopper's session: identity, cart, offers, checkout and payments.
///
/// This struct is cheaply cloneable via `Arc`. Every component it hands out
/// shares the same identity, store and API client.
pub struct SessionContext<A> {
    inner: Arc<SessionContextInner<A>>,
}

struct SessionContextInner<A> {
    config: StorefrontConfig,
    api: A,
    store: SharedStore,
    identity: Arc<IdentityResolver>,
    cart: CartEngine<A>,
    payments: PaymentVerifier<A>,
}

impl<A> Clone for SessionContext<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> std::fmt::Debug for SessionContext<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("config", &self.inner.config)
            .field("identity", &self.inner.identity)
            .finish_non_exhaustive()
    }
}

impl SessionContext<RestClient> {
    /// Build the live session: REST client plus file-backed storage.
    ///
    /// If the storage file cannot be opened the session falls back to
    /// in-memory storage; the guest id then lasts only for this process.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn connect(config: StorefrontConfig) -> std::result::Result<Self, ApiError> {
        let api = RestClient::new(&config.api)?;

        let store: SharedStore = match FileStore::open(&config.storage_path) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                warn!(
                    path = %config.storage_path.display(),
                    error = %e,
                    "Storage unavailable, using in-memory storage"
                );
                Arc::new(MemoryStore::new())
            }
        };

        Ok(Self::new(config, api, store))
    }
}

impl<A: CommerceApi> SessionContext<A> {
    /// Create a session over any API implementation and store.
    ///
    /// The shopper starts logged in when the config carries an auth token.
    #[must_use]
    pub fn new(config: StorefrontConfig, api: A, store: SharedStore) -> Self {
        let session = config
            .auth_token
            .clone()
            .map(|token| AuthSession::new(token, config.user_id));
        let identity = Arc::new(IdentityResolver::new(Arc::clone(&store), session));

        let cart = CartEngine::new(api.clone(), Arc::clone(&identity), config.cart_debounce);
        let payments =
            PaymentVerifier::new(api.clone(), Arc::clone(&store), config.payment_cache_ttl);

        Self {
            inner: Arc::new(SessionContextInner {
                config,
                api,
                store,
                identity,
                cart,
                payments,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn api(&self) -> &A {
        &self.inner.api
    }

    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.inner.store
    }

    #[must_use]
    pub fn identity(&self) -> &Arc<IdentityResolver> {
        &self.inner.identity
    }

    /// The session's cart. Every call returns a handle to the same cart.
    #[must_use]
    pub fn cart(&self) -> CartEngine<A> {
        self.inner.cart.clone()
    }

    /// The session's payment verifier, shared so concurrent verifications
    /// are serialised.
    #[must_use]
    pub fn payment_verifier(&self) -> PaymentVerifier<A> {
        self.inner.payments.clone()
    }

    #[must_use]
    pub fn checkout(&self) -> CheckoutService<A> {
        CheckoutService::new(self.inner.api.clone(), Arc::clone(&self.inner.identity))
    }

    /// Start redeeming an offer that was already fetched.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the offer cannot be redeemed.
    pub fn offer_flow(&self, offer: Offer) -> Result<OfferFlow<A>> {
        OfferFlow::new(
            self.inner.api.clone(),
            Arc::clone(&self.inner.identity),
            offer,
        )
    }

    /// Fetch an offer and start redeeming it.
    ///
    /// # Errors
    ///
    /// Returns `Fetch` if the offer could not be loaded, or `Validation` if it
    /// cannot be redeemed.
    pub async fn open_offer(&self, offer_id: OfferId) -> Result<OfferFlow<A>> {
        OfferFlow::open(
            self.inner.api.clone(),
            Arc::clone(&self.inner.identity),
            offer_id,
        )
        .await
    }

    /// Log in and reload the cart for the new identity.
    ///
    /// # Errors
    ///
    /// Returns `Fetch` if the cart reload failed; the login itself stands.
    pub async fn login(&self, token: SecretString, user_id: Option<UserId>) -> Result<()> {
        self.flush_before_switch().await;
        self.inner
            .identity
            .login(AuthSession::new(token, user_id));
        set_sentry_user(&self.inner.identity.resolve());
        info!("Logged in");
        self.inner.cart.load().await.map(|_| ())
    }

    /// Log out and reload the guest cart.
    ///
    /// # Errors
    ///
    /// Returns `Fetch` if the cart reload failed; the logout itself stands.
    pub async fn logout(&self) -> Result<()> {
        self.flush_before_switch().await;
        self.inner.identity.logout();
        clear_sentry_user();
        info!("Logged out");
        self.inner.cart.load().await.map(|_| ())
    }

    /// Send pending cart edits, place an order for the cart and empty it.
    ///
    /// # Errors
    ///
    /// Returns the first cart sync failure, or any checkout error. The cart
    /// is only emptied once the order exists.
    #[instrument(skip_all)]
    pub async fn place_order(&self, details: &CheckoutDetails) -> Result<OrderPlacement> {
        self.inner.cart.flush().await?;
        let lines = self.inner.cart.lines();
        let placement = self.checkout().place_order(details, &lines).await?;
        self.inner.cart.clear_local();
        Ok(placement)
    }

    /// Edits belong to the old identity's cart; send them before switching.
    async fn flush_before_switch(&self) {
        if let Err(e) = self.inner.cart.flush().await {
            warn!(error = %e, "Cart edits failed before identity switch");
        }
    }
}
