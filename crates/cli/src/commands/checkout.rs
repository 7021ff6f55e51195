//! Checkout command.
//!
//! # Usage
//!
//! ```bash
//! bb checkout --name "Ana" --phone 555-0100 --address "1 Main St"
//! bb checkout -n "Ana" -p 555-0100 -a "1 Main St" --payment online
//! ```

use bitebox_storefront::api::{CheckoutDetails, CommerceApi};
use bitebox_storefront::{SessionContext, SessionError};

/// Place an order for the current cart.
pub async fn place<A: CommerceApi>(
    ctx: &SessionContext<A>,
    details: &CheckoutDetails,
) -> Result<(), SessionError> {
    ctx.cart().load().await?;
    let placement = ctx.place_order(details).await?;

    tracing::info!(
        "Order {} placed (#{})",
        placement.order_number,
        placement.order_id
    );
    if let Some(url) = placement.redirect_url {
        tracing::info!("Complete your payment at: {}", url);
        tracing::info!("Then run: bb payment verify <session id from the return link>");
    }
    Ok(())
}
