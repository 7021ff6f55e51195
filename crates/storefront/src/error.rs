//! Unified error handling with Sentry integration.
//!
//! Every public session-core operation returns `Result<T, SessionError>`.
//! Server-side class failures are captured to Sentry by [`SessionError::capture`];
//! local precondition failures never are.

use thiserror::Error;

use crate::api::ApiError;
use crate::identity::CallerIdentity;
use crate::storage::StorageError;

/// Error type for the commerce session core.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No usable caller identity for an order request.
    #[error("Identity unavailable: no user id or guest id for this request")]
    IdentityUnavailable,

    /// A remote call failed or the backend rejected it.
    #[error("Fetch error: {0}")]
    Fetch(#[from] ApiError),

    /// A local precondition was violated; nothing was sent.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Payment verification was requested without a session or guest id.
    #[error("Missing payment session id or guest id")]
    MissingIdentifiers,

    /// Durable storage failed where the caller asked to persist.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Whether the shopper can recover by retrying an action already present
    /// in the flow (re-edit, re-submit, reload).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::IdentityUnavailable)
    }

    /// Message safe to show to the shopper.
    ///
    /// Backend rejections are passed through verbatim; transport and
    /// internal details are not exposed.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Fetch(ApiError::Rejected(message)) => message.clone(),
            Self::Fetch(ApiError::RateLimited(secs)) => {
                format!("Too many requests, try again in {secs} seconds")
            }
            Self::Fetch(ApiError::NotFound(what)) => format!("Not found: {what}"),
            Self::Fetch(_) => "Could not reach the store, please try again".to_string(),
            Self::Validation(message) => message.clone(),
            Self::IdentityUnavailable => "Please sign in again to place this order".to_string(),
            Self::MissingIdentifiers => "Payment session not found".to_string(),
            Self::Storage(_) => "Could not save local data".to_string(),
        }
    }

    /// Capture server-side class errors to Sentry.
    ///
    /// Validation failures and backend rejections are expected outcomes and
    /// are only logged at debug level.
    pub fn capture(&self) {
        let server_side = match self {
            Self::Fetch(err) => err.is_server_side(),
            Self::Storage(_) | Self::IdentityUnavailable => true,
            Self::Validation(_) | Self::MissingIdentifiers => false,
        };

        if server_side {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Session error"
            );
        } else {
            tracing::debug!(error = %self, "Session error (not captured)");
        }
    }
}

/// Result type alias for `SessionError`.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Set the Sentry user context from the resolved identity.
///
/// Guests are tagged by guest id so a shopper's errors can be correlated
/// before and after login.
pub fn set_sentry_user(identity: &CallerIdentity) {
    let user = match identity {
        CallerIdentity::Authenticated(session) => sentry::User {
            id: session.user_id.map(|id| id.to_string()),
            ..Default::default()
        },
        CallerIdentity::Guest(guest_id) => sentry::User {
            username: Some(format!("guest:{guest_id}")),
            ..Default::default()
        },
    };

    sentry::configure_scope(|scope| {
        scope.set_user(Some(user));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for shopper actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Changed quantity", Some(&[("line_id", "12"), ("quantity", "3")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        let err = SessionError::Validation("select 2 more items".to_string());
        assert_eq!(err.to_string(), "Validation error: select 2 more items");

        let err = SessionError::MissingIdentifiers;
        assert_eq!(err.to_string(), "Missing payment session id or guest id");
    }

    #[test]
    fn test_user_message_passes_rejections_verbatim() {
        let err = SessionError::Fetch(ApiError::Rejected("Offer has expired".to_string()));
        assert_eq!(err.user_message(), "Offer has expired");
    }

    #[test]
    fn test_user_message_hides_transport_details() {
        let err = SessionError::Fetch(ApiError::Status {
            status: 502,
            message: "upstream connect error at 10.0.0.3".to_string(),
        });
        assert!(!err.user_message().contains("10.0.0.3"));
    }

    #[test]
    fn test_recoverable() {
        assert!(SessionError::Validation(String::new()).is_recoverable());
        assert!(SessionError::Fetch(ApiError::RateLimited(3)).is_recoverable());
        assert!(!SessionError::IdentityUnavailable.is_recoverable());
    }
}
