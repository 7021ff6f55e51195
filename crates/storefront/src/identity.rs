//! Caller identity resolution.
//!
//! Every remote call is made either as an authenticated user (bearer token)
//! or as an anonymous guest (device-persisted guest id). The resolver owns the
//! guest id: it is generated once, written to durable storage once, and
//! memoised for the lifetime of the resolver.

use std::sync::{Mutex, PoisonError, RwLock};

use bitebox_core::{GuestId, UserId};
use chrono::{DateTime, Utc};
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::storage::{SharedStore, keys};

/// An authenticated session issued by the login flow.
#[derive(Debug, Clone)]
pub struct AuthSession {
    /// Bearer token sent with authenticated requests.
    pub token: SecretString,
    /// The account the token belongs to, if the login flow reported it.
    pub user_id: Option<UserId>,
    /// Token expiry, if known.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    /// Create a session with no known expiry.
    #[must_use]
    pub fn new(token: SecretString, user_id: Option<UserId>) -> Self {
        Self {
            token,
            user_id,
            expires_at: None,
        }
    }

    /// A session is valid when it carries a non-blank token that has not
    /// expired.
    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.token.expose_secret().trim().is_empty()
            && self.expires_at.is_none_or(|expires| expires > now)
    }
}

/// Who is making a request.
#[derive(Debug, Clone)]
pub enum CallerIdentity {
    Authenticated(AuthSession),
    Guest(GuestId),
}

impl CallerIdentity {
    /// Whether this is an authenticated identity.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// The owner named on an order-creation request. Exactly one is populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOwner {
    User(UserId),
    Guest(GuestId),
}

/// Resolves the caller identity used by every other component.
pub struct IdentityResolver {
    store: SharedStore,
    session: RwLock<Option<AuthSession>>,
    guest_id: Mutex<Option<GuestId>>,
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl IdentityResolver {
    /// Create a resolver backed by `store`, optionally already logged in.
    #[must_use]
    pub fn new(store: SharedStore, session: Option<AuthSession>) -> Self {
        Self {
            store,
            session: RwLock::new(session),
            guest_id: Mutex::new(None),
        }
    }

    /// Resolve the current caller identity.
    ///
    /// Returns `Authenticated` when a valid session is present, otherwise
    /// `Guest` (creating the guest id on first use).
    #[must_use]
    pub fn resolve(&self) -> CallerIdentity {
        if let Some(session) = self.valid_session() {
            return CallerIdentity::Authenticated(session);
        }
        CallerIdentity::Guest(self.guest_id())
    }

    /// Get the device's guest id, creating and persisting it if absent.
    ///
    /// Idempotent: every call returns the same value for the lifetime of the
    /// resolver. Storage failures fall back to an in-memory id rather than
    /// failing the caller.
    #[must_use]
    pub fn guest_id(&self) -> GuestId {
        let mut cached = self
            .guest_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(id) = cached.as_ref() {
            return id.clone();
        }

        let id = self.load_or_create_guest_id();
        *cached = Some(id.clone());
        id
    }

    fn load_or_create_guest_id(&self) -> GuestId {
        match self.store.get(keys::GUEST_ID) {
            Ok(Some(raw)) => match GuestId::parse(&raw) {
                Ok(id) => {
                    debug!("Loaded persisted guest id");
                    return id;
                }
                Err(e) => warn!(error = %e, "Stored guest id is malformed, replacing it"),
            },
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Guest id storage unreadable, using in-memory guest id");
                return generate_guest_id(&mut rand::rng());
            }
        }

        let id = generate_guest_id(&mut rand::rng());
        match self.store.set(keys::GUEST_ID, id.as_str()) {
            Ok(()) => info!("Created guest id"),
            Err(e) => warn!(error = %e, "Could not persist guest id, using it in-memory only"),
        }
        id
    }

    /// Switch to authenticated mode. The guest id is kept.
    pub fn login(&self, session: AuthSession) {
        *self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    /// Return to guest mode.
    pub fn logout(&self) {
        *self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Whether a valid authenticated session is active.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.valid_session().is_some()
    }

    /// The owner to name on an order-creation request.
    ///
    /// # Errors
    ///
    /// Returns `IdentityUnavailable` if the caller is authenticated but the
    /// session does not carry a user id.
    pub fn order_owner(&self) -> Result<OrderOwner, SessionError> {
        match self.resolve() {
            CallerIdentity::Authenticated(session) => session
                .user_id
                .map(OrderOwner::User)
                .ok_or(SessionError::IdentityUnavailable),
            CallerIdentity::Guest(guest_id) => Ok(OrderOwner::Guest(guest_id)),
        }
    }

    fn valid_session(&self) -> Option<AuthSession> {
        let session = self.session.read().unwrap_or_else(PoisonError::into_inner);
        session
            .as_ref()
            .filter(|s| s.is_valid(Utc::now()))
            .cloned()
    }
}

/// Draw a fresh guest id from `rng`.
pub fn generate_guest_id(rng: &mut impl Rng) -> GuestId {
    GuestId::from_indices(std::array::from_fn(|_| {
        rng.random_range(0..GuestId::ALPHABET.len())
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::storage::{KeyValueStore, MemoryStore, StorageError};

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Poisoned)
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Poisoned)
        }
        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Poisoned)
        }
    }

    fn session(token: &str, user: Option<i32>) -> AuthSession {
        AuthSession::new(SecretString::from(token), user.map(UserId::new))
    }

    #[test]
    fn test_guest_id_created_once_and_persisted() {
        let store = Arc::new(MemoryStore::new());
        let resolver = IdentityResolver::new(store.clone(), None);

        let first = resolver.guest_id();
        let second = resolver.guest_id();
        assert_eq!(first, second);
        assert_eq!(
            store.get(keys::GUEST_ID).unwrap().as_deref(),
            Some(first.as_str())
        );
    }

    #[test]
    fn test_existing_guest_id_is_reused() {
        let store = Arc::new(MemoryStore::new());
        store.set(keys::GUEST_ID, "KEEPME0123456789").unwrap();

        let resolver = IdentityResolver::new(store, None);
        assert_eq!(resolver.guest_id().as_str(), "KEEPME0123456789");
    }

    #[test]
    fn test_malformed_guest_id_is_replaced() {
        let store = Arc::new(MemoryStore::new());
        store.set(keys::GUEST_ID, "not-a-guest-id").unwrap();

        let resolver = IdentityResolver::new(store.clone(), None);
        let id = resolver.guest_id();
        assert_eq!(
            store.get(keys::GUEST_ID).unwrap().as_deref(),
            Some(id.as_str())
        );
    }

    #[test]
    fn test_storage_failure_falls_back_to_memory() {
        let resolver = IdentityResolver::new(Arc::new(BrokenStore), None);
        let first = resolver.guest_id();
        assert_eq!(first, resolver.guest_id());
        assert!(GuestId::parse(first.as_str()).is_ok());
    }

    #[test]
    fn test_resolve_modes() {
        let store = Arc::new(MemoryStore::new());
        let resolver = IdentityResolver::new(store.clone(), None);
        assert!(matches!(resolver.resolve(), CallerIdentity::Guest(_)));
        let guest = resolver.guest_id();

        resolver.login(session("token-abc", Some(5)));
        assert!(resolver.resolve().is_authenticated());

        // Login keeps the guest id for already-created guest orders.
        assert_eq!(
            store.get(keys::GUEST_ID).unwrap().as_deref(),
            Some(guest.as_str())
        );

        resolver.logout();
        match resolver.resolve() {
            CallerIdentity::Guest(id) => assert_eq!(id, guest),
            CallerIdentity::Authenticated(_) => panic!("expected guest after logout"),
        }
    }

    #[test]
    fn test_expired_or_blank_session_is_guest() {
        let store = Arc::new(MemoryStore::new());

        let mut expired = session("token-abc", Some(5));
        expired.expires_at = Some(Utc::now() - Duration::minutes(1));
        let resolver = IdentityResolver::new(store.clone(), Some(expired));
        assert!(!resolver.is_authenticated());

        let resolver = IdentityResolver::new(store, Some(session("   ", Some(5))));
        assert!(!resolver.is_authenticated());
    }

    #[test]
    fn test_order_owner() {
        let store = Arc::new(MemoryStore::new());
        let resolver = IdentityResolver::new(store, Some(session("token", Some(9))));
        assert_eq!(resolver.order_owner().unwrap(), OrderOwner::User(UserId::new(9)));

        resolver.login(session("token", None));
        assert!(matches!(
            resolver.order_owner(),
            Err(SessionError::IdentityUnavailable)
        ));

        resolver.logout();
        assert!(matches!(resolver.order_owner(), Ok(OrderOwner::Guest(_))));
    }
}
