//! Payment commands.
//!
//! # Usage
//!
//! ```bash
//! bb payment verify cs_test_123
//! bb payment verify cs_test_123 --guest-id K3J9QX0A1B2C3D4E
//! ```

use bitebox_storefront::api::CommerceApi;
use bitebox_storefront::{SessionContext, SessionError};

/// Verify a payment session, using this device's guest id by default.
pub async fn verify<A: CommerceApi>(
    ctx: &SessionContext<A>,
    session_id: &str,
    guest_id: Option<&str>,
) -> Result<(), SessionError> {
    let device_guest = ctx.identity().guest_id();
    let guest_id = guest_id.unwrap_or_else(|| device_guest.as_str());

    let result = ctx
        .payment_verifier()
        .verify(Some(session_id), Some(guest_id))
        .await?;

    let source = if result.from_cache { " (cached)" } else { "" };
    match result.response.data {
        Some(payment) if result.response.success => {
            tracing::info!(
                "Order {} is {:?}, total {}{}",
                payment.order_number,
                payment.payment_status,
                payment.total_amount,
                source
            );
        }
        _ => tracing::info!("Payment not verified: {}{}", result.response.message, source),
    }
    Ok(())
}
