//! Offer redemption against a scripted backend.

#![allow(clippy::unwrap_used)]

use bitebox_core::{CategoryId, OfferId, OrderId, ProductId, SizeId};
use bitebox_integration_tests::{
    Call, FakeCommerceApi, Failure, Op, catalog_item, guest_session, offer, user_session,
};
use bitebox_storefront::SessionError;
use bitebox_storefront::offer::OfferState;

const PIZZA: CategoryId = CategoryId::new(1);
const LARGE: SizeId = SizeId::new(2);
const OFFER: OfferId = OfferId::new(11);

/// Backend with a buy-1-get-1 pizza offer and two large pizzas.
fn backend() -> FakeCommerceApi {
    let api = FakeCommerceApi::new();
    api.add_offer(offer(11, PIZZA, LARGE, 1, 1));
    api.set_catalog(
        PIZZA,
        LARGE,
        vec![catalog_item(42, PIZZA, LARGE), catalog_item(43, PIZZA, LARGE)],
    );
    api
}

fn offer_orders(api: &FakeCommerceApi) -> usize {
    api.count(|c| matches!(c, Call::CreateOfferOrder(_)))
}

#[tokio::test]
async fn test_guest_redeems_buy_one_get_one() {
    let api = backend();
    let ctx = guest_session(&api);

    let mut flow = ctx.open_offer(OFFER).await.unwrap();
    assert_eq!(flow.machine().state(), OfferState::SelectingSize);

    flow.select_size(LARGE).await.unwrap();
    assert_eq!(flow.catalog().len(), 2);
    flow.select_buy_item(ProductId::new(42)).await.unwrap();
    flow.advance_to_free_items().await.unwrap();
    flow.select_free_item(ProductId::new(43)).await.unwrap();
    assert!(flow.machine().can_submit());

    let order_id = flow.submit().await.unwrap();
    assert_eq!(flow.machine().state(), OfferState::Submitted { order_id });
    assert_eq!(flow.machine().order_id(), Some(order_id));

    let request = api
        .calls()
        .into_iter()
        .find_map(|c| match c {
            Call::CreateOfferOrder(request) => Some(request),
            _ => None,
        })
        .unwrap();
    assert_eq!(request.offer_id, OFFER);
    assert_eq!(request.buy_item_ids, vec![ProductId::new(42)]);
    assert_eq!(request.free_item_ids, vec![ProductId::new(43)]);
    assert_eq!(request.guest_id, Some(ctx.identity().guest_id()));
    assert_eq!(request.user_id, None);
}

#[tokio::test]
async fn test_user_order_names_user() {
    let api = backend();
    let ctx = user_session(&api, Some(8));

    let mut flow = ctx.open_offer(OFFER).await.unwrap();
    flow.select_size(LARGE).await.unwrap();
    flow.select_buy_item(ProductId::new(42)).await.unwrap();
    flow.advance_to_free_items().await.unwrap();
    flow.select_free_item(ProductId::new(42)).await.unwrap();
    flow.submit().await.unwrap();

    let request = api
        .calls()
        .into_iter()
        .find_map(|c| match c {
            Call::CreateOfferOrder(request) => Some(request),
            _ => None,
        })
        .unwrap();
    assert_eq!(request.user_id, Some(bitebox_core::UserId::new(8)));
    assert_eq!(request.guest_id, None);
}

#[tokio::test]
async fn test_incomplete_selection_is_not_submitted() {
    let api = backend();
    let ctx = guest_session(&api);

    let mut flow = ctx.open_offer(OFFER).await.unwrap();
    flow.select_size(LARGE).await.unwrap();

    // Still choosing items to buy.
    assert!(matches!(flow.submit().await, Err(SessionError::Validation(_))));
    assert!(matches!(
        flow.advance_to_free_items().await,
        Err(SessionError::Validation(_))
    ));

    flow.select_buy_item(ProductId::new(42)).await.unwrap();
    flow.advance_to_free_items().await.unwrap();

    // No free item yet.
    assert!(matches!(flow.submit().await, Err(SessionError::Validation(_))));
    assert_eq!(flow.machine().state(), OfferState::SelectingFreeItems);
    assert_eq!(offer_orders(&api), 0);
}

#[tokio::test]
async fn test_selection_limits_and_scope() {
    let api = backend();
    api.set_catalog(PIZZA, SizeId::new(3), vec![catalog_item(50, PIZZA, SizeId::new(3))]);
    let ctx = guest_session(&api);

    let mut flow = ctx.open_offer(OFFER).await.unwrap();
    assert!(matches!(
        flow.select_size(SizeId::new(3)).await,
        Err(SessionError::Validation(_))
    ));

    flow.select_size(LARGE).await.unwrap();
    assert!(matches!(
        flow.select_buy_item(ProductId::new(50)).await,
        Err(SessionError::Validation(_))
    ));

    flow.select_buy_item(ProductId::new(42)).await.unwrap();
    assert!(matches!(
        flow.select_buy_item(ProductId::new(43)).await,
        Err(SessionError::Validation(_))
    ));
    assert_eq!(flow.machine().buy_items().len(), 1);
    assert_eq!(flow.machine().buy_remaining(), 0);
}

#[tokio::test]
async fn test_rejected_submit_keeps_selection_for_retry() {
    let api = backend();
    api.fail(
        Op::CreateOfferOrder,
        Failure::Rejected("Offer limit reached for today".to_string()),
    );
    let ctx = guest_session(&api);

    let mut flow = ctx.open_offer(OFFER).await.unwrap();
    flow.select_size(LARGE).await.unwrap();
    flow.select_buy_item(ProductId::new(42)).await.unwrap();
    flow.advance_to_free_items().await.unwrap();
    flow.select_free_item(ProductId::new(43)).await.unwrap();

    assert!(matches!(flow.submit().await, Err(SessionError::Fetch(_))));
    assert_eq!(flow.machine().state(), OfferState::SelectingFreeItems);
    assert_eq!(
        flow.machine().last_error(),
        Some("Offer limit reached for today")
    );
    assert_eq!(flow.machine().buy_items().len(), 1);
    assert_eq!(flow.machine().free_items().len(), 1);

    api.recover(Op::CreateOfferOrder);
    let order_id = flow.submit().await.unwrap();
    assert_eq!(flow.machine().order_id(), Some(order_id));
    assert_eq!(flow.machine().last_error(), None);
    assert_eq!(offer_orders(&api), 2);
}

#[tokio::test]
async fn test_user_without_id_cannot_submit() {
    let api = backend();
    let ctx = user_session(&api, None);

    let mut flow = ctx.open_offer(OFFER).await.unwrap();
    flow.select_size(LARGE).await.unwrap();
    flow.select_buy_item(ProductId::new(42)).await.unwrap();
    flow.advance_to_free_items().await.unwrap();
    flow.select_free_item(ProductId::new(43)).await.unwrap();

    assert!(matches!(
        flow.submit().await,
        Err(SessionError::IdentityUnavailable)
    ));
    assert_eq!(offer_orders(&api), 0);
    assert_eq!(flow.machine().state(), OfferState::SelectingFreeItems);
}

#[tokio::test]
async fn test_no_free_items_skips_free_lookup() {
    let api = backend();
    api.add_offer(offer(12, PIZZA, LARGE, 2, 0));
    let ctx = guest_session(&api);

    let mut flow = ctx.open_offer(OfferId::new(12)).await.unwrap();
    flow.select_size(LARGE).await.unwrap();
    flow.select_buy_item(ProductId::new(42)).await.unwrap();
    flow.select_buy_item(ProductId::new(42)).await.unwrap();
    flow.advance_to_free_items().await.unwrap();

    assert_eq!(api.count(|c| matches!(c, Call::LookupCatalog(..))), 1);
    assert!(flow.machine().can_submit());
    assert_eq!(flow.submit().await.unwrap(), OrderId::new(501));
}

#[tokio::test]
async fn test_going_back_resets_selection() {
    let api = backend();
    let ctx = guest_session(&api);

    let mut flow = ctx.open_offer(OFFER).await.unwrap();
    flow.select_size(LARGE).await.unwrap();
    flow.select_buy_item(ProductId::new(42)).await.unwrap();
    flow.advance_to_free_items().await.unwrap();
    flow.select_free_item(ProductId::new(43)).await.unwrap();

    flow.go_back_to_buy_items().await.unwrap();
    assert_eq!(flow.machine().state(), OfferState::SelectingBuyItems);
    assert_eq!(flow.machine().free_items().len(), 1);

    flow.go_back_to_size().await.unwrap();
    assert_eq!(flow.machine().state(), OfferState::SelectingSize);
    assert!(flow.machine().buy_items().is_empty());
    assert!(flow.machine().free_items().is_empty());
    assert!(flow.catalog().is_empty());
}

#[tokio::test]
async fn test_inactive_offer_cannot_be_opened() {
    let api = FakeCommerceApi::new();
    let mut closed = offer(20, PIZZA, LARGE, 1, 1);
    closed.active = false;
    api.add_offer(closed);
    let ctx = guest_session(&api);

    assert!(matches!(
        ctx.open_offer(OfferId::new(20)).await,
        Err(SessionError::Validation(_))
    ));
    assert!(matches!(
        ctx.open_offer(OfferId::new(99)).await,
        Err(SessionError::Fetch(_))
    ));
}

#[tokio::test]
async fn test_reopening_starts_fresh() {
    let api = backend();
    let ctx = guest_session(&api);

    let mut flow = ctx.open_offer(OFFER).await.unwrap();
    flow.select_size(LARGE).await.unwrap();
    flow.select_buy_item(ProductId::new(42)).await.unwrap();
    flow.close();

    let flow = ctx.open_offer(OFFER).await.unwrap();
    assert_eq!(flow.machine().state(), OfferState::SelectingSize);
    assert!(flow.machine().buy_items().is_empty());
    assert!(flow.catalog().is_empty());
}
