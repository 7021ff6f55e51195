//! Offer redemption ("buy B, get F free").
//!
//! [`OfferMachine`] holds the rules; [`OfferFlow`] drives it against the
//! backend, performing the catalog lookups and order submission the machine
//! asks for.

mod machine;

use std::sync::Arc;

use bitebox_core::{CategoryId, OfferId, OrderId, ProductId, SizeId};
use tracing::{debug, info, instrument, warn};

pub use machine::{
    CatalogPurpose, OfferEffect, OfferEvent, OfferMachine, OfferOrderDraft, OfferState,
    TransitionError,
};

use crate::api::{CatalogItem, CommerceApi, Offer, OfferOrderRequest};
use crate::error::{Result, SessionError, add_breadcrumb};
use crate::identity::IdentityResolver;

/// One open redemption of an offer.
///
/// Dropping or [closing](Self::close) the flow discards the selection;
/// opening the offer again starts from size selection.
pub struct OfferFlow<A> {
    api: A,
    identity: Arc<IdentityResolver>,
    machine: OfferMachine,
    catalog: Vec<CatalogItem>,
}

impl<A> std::fmt::Debug for OfferFlow<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfferFlow")
            .field("machine", &self.machine)
            .field("catalog", &self.catalog.len())
            .finish_non_exhaustive()
    }
}

impl<A: CommerceApi> OfferFlow<A> {
    /// Start a redemption of an already fetched offer.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the offer is inactive or asks for no items.
    pub fn new(api: A, identity: Arc<IdentityResolver>, offer: Offer) -> Result<Self> {
        if !offer.active {
            return Err(SessionError::Validation(format!(
                "Offer \"{}\" is no longer available",
                offer.title
            )));
        }
        if offer.buy_quantity == 0 {
            return Err(SessionError::Validation(format!(
                "Offer \"{}\" has no items to buy",
                offer.title
            )));
        }

        add_breadcrumb(
            "offer",
            "Opened offer",
            Some(&[("offer_id", offer.id.to_string().as_str())]),
        );
        Ok(Self {
            api,
            identity,
            machine: OfferMachine::new(offer),
            catalog: Vec::new(),
        })
    }

    /// Fetch an offer and start redeeming it.
    ///
    /// # Errors
    ///
    /// Returns `Fetch` if the offer could not be loaded, or `Validation` if it
    /// cannot be redeemed.
    #[instrument(skip(api, identity))]
    pub async fn open(api: A, identity: Arc<IdentityResolver>, offer_id: OfferId) -> Result<Self> {
        let offer = api.get_offer(offer_id).await?;
        Self::new(api, identity, offer)
    }

    #[must_use]
    pub const fn machine(&self) -> &OfferMachine {
        &self.machine
    }

    /// Items the current step can choose from.
    #[must_use]
    pub fn catalog(&self) -> &[CatalogItem] {
        &self.catalog
    }

    /// # Errors
    ///
    /// Returns `Validation` if the size is not offered, or `Fetch` if the
    /// items for the size could not be loaded (the size stays selected; use
    /// [`refresh_items`](Self::refresh_items) to retry).
    pub async fn select_size(&mut self, size_id: SizeId) -> Result<()> {
        self.dispatch(OfferEvent::SelectSize(size_id)).await
    }

    /// # Errors
    ///
    /// Returns `Validation` if the item is not listed or the buy selection is
    /// full.
    pub async fn select_buy_item(&mut self, product_id: ProductId) -> Result<()> {
        let item = self.catalog_item(product_id)?;
        self.dispatch(OfferEvent::SelectBuyItem(item)).await
    }

    /// # Errors
    ///
    /// Returns `Validation` if the item is not selected.
    pub async fn remove_buy_item(&mut self, product_id: ProductId) -> Result<()> {
        self.dispatch(OfferEvent::RemoveBuyItem(product_id)).await
    }

    /// # Errors
    ///
    /// Returns `Validation` until the buy selection is complete, or `Fetch` if
    /// the free items could not be loaded.
    pub async fn advance_to_free_items(&mut self) -> Result<()> {
        self.dispatch(OfferEvent::AdvanceToFreeItems).await
    }

    /// # Errors
    ///
    /// Returns `Validation` if the item is not listed or the free selection is
    /// full.
    pub async fn select_free_item(&mut self, product_id: ProductId) -> Result<()> {
        let item = self.catalog_item(product_id)?;
        self.dispatch(OfferEvent::SelectFreeItem(item)).await
    }

    /// # Errors
    ///
    /// Returns `Validation` if the item is not selected.
    pub async fn remove_free_item(&mut self, product_id: ProductId) -> Result<()> {
        self.dispatch(OfferEvent::RemoveFreeItem(product_id)).await
    }

    /// # Errors
    ///
    /// Returns `Validation` outside free item selection.
    pub async fn go_back_to_buy_items(&mut self) -> Result<()> {
        self.dispatch(OfferEvent::GoBackToBuyItems).await
    }

    /// # Errors
    ///
    /// Returns `Validation` outside buy item selection.
    pub async fn go_back_to_size(&mut self) -> Result<()> {
        self.dispatch(OfferEvent::GoBackToSize).await?;
        self.catalog.clear();
        Ok(())
    }

    /// Place the order.
    ///
    /// # Errors
    ///
    /// Returns `Validation` without contacting the backend unless exactly B
    /// buy and F free items are selected. A backend rejection returns
    /// `Fetch`; the selection is kept and the message is available from
    /// [`OfferMachine::last_error`] so the shopper can retry.
    #[instrument(skip(self), fields(offer_id = %self.machine.offer().id))]
    pub async fn submit(&mut self) -> Result<OrderId> {
        self.dispatch(OfferEvent::Submit).await?;
        self.machine.order_id().ok_or_else(|| {
            SessionError::Validation("The offer order was not placed".to_string())
        })
    }

    /// Reload the items for the current step.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when no item step is active, or `Fetch` if the
    /// lookup failed.
    pub async fn refresh_items(&mut self) -> Result<()> {
        let (category_id, size_id, purpose) = self.machine.catalog_scope().ok_or_else(|| {
            SessionError::Validation("Choose a size before browsing items".to_string())
        })?;
        self.lookup(category_id, size_id, purpose).await
    }

    /// Discard the redemption.
    pub fn close(self) {
        debug!(
            offer_id = %self.machine.offer().id,
            state = %self.machine.state(),
            "Offer flow closed"
        );
    }

    async fn dispatch(&mut self, event: OfferEvent) -> Result<()> {
        let (machine, effect) = self.machine.transition(event)?;
        self.machine = machine;

        match effect {
            None => Ok(()),
            Some(OfferEffect::LookupCatalog {
                category_id,
                size_id,
                purpose,
            }) => self.lookup(category_id, size_id, purpose).await,
            Some(OfferEffect::SubmitOrder(draft)) => self.place(draft).await,
        }
    }

    async fn lookup(
        &mut self,
        category_id: CategoryId,
        size_id: SizeId,
        purpose: CatalogPurpose,
    ) -> Result<()> {
        self.catalog.clear();
        let items = self.api.lookup_catalog(category_id, size_id).await?;
        debug!(?purpose, items = items.len(), "Offer catalog loaded");
        self.catalog = items;
        Ok(())
    }

    async fn place(&mut self, draft: OfferOrderDraft) -> Result<()> {
        let outcome = match self.identity.order_owner() {
            Ok(owner) => {
                let request = OfferOrderRequest::new(
                    draft.offer_id,
                    draft.buy_item_ids,
                    draft.free_item_ids,
                    owner,
                );
                let identity = self.identity.resolve();
                self.api
                    .create_offer_order(&identity, &request)
                    .await
                    .map_err(SessionError::from)
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(order_id) => {
                self.machine = self
                    .machine
                    .transition(OfferEvent::SubmitSucceeded(order_id))?
                    .0;
                info!(%order_id, "Offer order placed");
                add_breadcrumb(
                    "offer",
                    "Placed offer order",
                    Some(&[("order_id", order_id.to_string().as_str())]),
                );
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Offer order failed");
                err.capture();
                self.machine = self
                    .machine
                    .transition(OfferEvent::SubmitFailed(err.user_message()))?
                    .0;
                Err(err)
            }
        }
    }

    fn catalog_item(&self, product_id: ProductId) -> Result<CatalogItem> {
        self.catalog
            .iter()
            .find(|i| i.id == product_id)
            .cloned()
            .ok_or_else(|| {
                SessionError::Validation(format!("Item {product_id} is not on this offer's menu"))
            })
    }
}
