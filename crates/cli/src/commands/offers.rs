//! Offer commands.
//!
//! # Usage
//!
//! ```bash
//! # List offers
//! bb offers list
//!
//! # Buy two large pizzas, get one free
//! bb offer redeem 11 --size 2 --buy 42 --buy 44 --free 43
//! ```

use bitebox_core::{OfferId, ProductId, SizeId};
use bitebox_storefront::api::CommerceApi;
use bitebox_storefront::{SessionContext, SessionError};

/// Print every published offer.
pub async fn list<A: CommerceApi>(ctx: &SessionContext<A>) -> Result<(), SessionError> {
    let offers = ctx.api().list_offers().await?;

    if offers.is_empty() {
        tracing::info!("No offers right now");
        return Ok(());
    }

    for offer in offers.iter().filter(|o| o.active) {
        let sizes: Vec<String> = offer
            .sizes
            .iter()
            .map(|s| format!("{}={}", s.id, s.name))
            .collect();
        tracing::info!(
            "  [{}] {} - buy {} get {} free (sizes: {})",
            offer.id,
            offer.title,
            offer.buy_quantity,
            offer.free_quantity,
            sizes.join(", ")
        );
    }
    Ok(())
}

/// Walk an offer redemption end to end and place the order.
pub async fn redeem<A: CommerceApi>(
    ctx: &SessionContext<A>,
    offer_id: OfferId,
    size_id: SizeId,
    buy: &[ProductId],
    free: &[ProductId],
) -> Result<(), SessionError> {
    let mut flow = ctx.open_offer(offer_id).await?;
    tracing::info!("Redeeming \"{}\"", flow.machine().offer().title);

    flow.select_size(size_id).await?;
    for product_id in buy {
        flow.select_buy_item(*product_id).await?;
    }

    flow.advance_to_free_items().await?;
    for product_id in free {
        flow.select_free_item(*product_id).await?;
    }

    let order_id = flow.submit().await?;
    tracing::info!("Offer order placed: #{}", order_id);
    flow.close();
    Ok(())
}
