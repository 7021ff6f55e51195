//! Cart commands.
//!
//! # Usage
//!
//! ```bash
//! bb cart show
//! bb cart add 42 --size 2 --quantity 2
//! bb cart change 7 -- -1
//! bb cart set 7 3
//! bb cart remove 7
//! ```
//!
//! Quantity edits are debounced by the cart engine and sent when the
//! command exits.

use bitebox_core::{CartLine, LineId, ProductId, SizeId};
use bitebox_storefront::api::CommerceApi;
use bitebox_storefront::{SessionContext, SessionError};

/// Load and print the cart.
pub async fn show<A: CommerceApi>(ctx: &SessionContext<A>) -> Result<(), SessionError> {
    let lines = ctx.cart().load().await?;
    print_cart(ctx, &lines);
    Ok(())
}

/// Add a product to the cart.
pub async fn add<A: CommerceApi>(
    ctx: &SessionContext<A>,
    product_id: ProductId,
    size_id: Option<SizeId>,
    quantity: u32,
) -> Result<(), SessionError> {
    let lines = ctx.cart().add_item(product_id, size_id, quantity).await?;
    tracing::info!("Added {} x product {}", quantity, product_id);
    print_cart(ctx, &lines);
    Ok(())
}

/// Change a line's quantity by `delta`.
pub async fn change<A: CommerceApi>(
    ctx: &SessionContext<A>,
    line_id: LineId,
    delta: i64,
) -> Result<(), SessionError> {
    let cart = ctx.cart();
    cart.load().await?;
    let quantity = cart.change_quantity(line_id, delta)?;
    tracing::info!("Line {} quantity is now {}", line_id, quantity);
    Ok(())
}

/// Set a line's quantity from user input.
pub async fn set<A: CommerceApi>(
    ctx: &SessionContext<A>,
    line_id: LineId,
    raw: &str,
) -> Result<(), SessionError> {
    let cart = ctx.cart();
    cart.load().await?;
    let quantity = cart.set_quantity_from_input(line_id, raw)?;
    tracing::info!("Line {} quantity is now {}", line_id, quantity);
    Ok(())
}

/// Remove a line.
pub async fn remove<A: CommerceApi>(
    ctx: &SessionContext<A>,
    line_id: LineId,
) -> Result<(), SessionError> {
    let cart = ctx.cart();
    cart.load().await?;
    cart.remove(line_id).await?;
    tracing::info!("Removed line {}", line_id);
    Ok(())
}

fn print_cart<A: CommerceApi>(ctx: &SessionContext<A>, lines: &[CartLine]) {
    if lines.is_empty() {
        tracing::info!("Your cart is empty");
        return;
    }

    for line in lines {
        let size = line.display.size.as_deref().unwrap_or("-");
        tracing::info!(
            "  [{}] {} ({}) {} x {} = {}",
            line.line_id,
            line.display.name,
            size,
            line.quantity,
            line.unit_price,
            line.line_total()
        );
    }

    let totals = ctx.cart().totals();
    tracing::info!("{} items, total {}", totals.item_count, totals.grand_total);
}
