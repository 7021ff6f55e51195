//! Identity command.
//!
//! # Usage
//!
//! ```bash
//! bb identity
//! ```
//!
//! # Environment Variables
//!
//! - `BITEBOX_AUTH_TOKEN` / `BITEBOX_USER_ID` - shop as a logged-in user
//! - `BITEBOX_STORAGE_PATH` - where the guest id is kept

use bitebox_storefront::api::CommerceApi;
use bitebox_storefront::config::token_fingerprint;
use bitebox_storefront::identity::CallerIdentity;
use bitebox_storefront::{SessionContext, SessionError};

/// Print who requests are made as.
///
/// The guest id is shown even when logged in; it keeps identifying guest
/// orders placed from this device.
pub fn show<A: CommerceApi>(ctx: &SessionContext<A>) -> Result<(), SessionError> {
    match ctx.identity().resolve() {
        CallerIdentity::Authenticated(session) => {
            let user = session
                .user_id
                .map_or_else(|| "unknown".to_string(), |id| id.to_string());
            tracing::info!(
                "Logged in as user {} (token {})",
                user,
                token_fingerprint(&session.token)
            );
        }
        CallerIdentity::Guest(_) => tracing::info!("Shopping as a guest"),
    }

    tracing::info!("Guest id: {}", ctx.identity().guest_id());
    tracing::info!("Storage: {}", ctx.config().storage_path.display());
    Ok(())
}
