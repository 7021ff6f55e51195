//! Pure offer redemption state machine.
//!
//! [`OfferMachine::transition`] never performs I/O. Work the caller must do
//! (catalog lookups, order submission) is returned as an [`OfferEffect`].

use bitebox_core::{CategoryId, OfferId, OrderId, ProductId, SizeId};
use thiserror::Error;

use crate::api::{CatalogItem, Offer};
use crate::error::SessionError;

/// Redemption progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferState {
    SelectingSize,
    SelectingBuyItems,
    SelectingFreeItems,
    Submitting,
    Submitted { order_id: OrderId },
}

impl std::fmt::Display for OfferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelectingSize => write!(f, "selecting a size"),
            Self::SelectingBuyItems => write!(f, "selecting items to buy"),
            Self::SelectingFreeItems => write!(f, "selecting free items"),
            Self::Submitting => write!(f, "submitting"),
            Self::Submitted { .. } => write!(f, "submitted"),
        }
    }
}

/// Input to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferEvent {
    SelectSize(SizeId),
    SelectBuyItem(CatalogItem),
    RemoveBuyItem(ProductId),
    AdvanceToFreeItems,
    SelectFreeItem(CatalogItem),
    RemoveFreeItem(ProductId),
    GoBackToBuyItems,
    GoBackToSize,
    Submit,
    SubmitSucceeded(OrderId),
    SubmitFailed(String),
}

impl OfferEvent {
    const fn name(&self) -> &'static str {
        match self {
            Self::SelectSize(_) => "Choosing a size",
            Self::SelectBuyItem(_) => "Adding an item to buy",
            Self::RemoveBuyItem(_) => "Removing an item to buy",
            Self::AdvanceToFreeItems => "Moving on to free items",
            Self::SelectFreeItem(_) => "Adding a free item",
            Self::RemoveFreeItem(_) => "Removing a free item",
            Self::GoBackToBuyItems => "Going back to items to buy",
            Self::GoBackToSize => "Going back to sizes",
            Self::Submit => "Placing the order",
            Self::SubmitSucceeded(_) | Self::SubmitFailed(_) => "Finishing the order",
        }
    }
}

/// Which selection a catalog lookup feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogPurpose {
    Buy,
    Free,
}

/// Work requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferEffect {
    LookupCatalog {
        category_id: CategoryId,
        size_id: SizeId,
        purpose: CatalogPurpose,
    },
    SubmitOrder(OfferOrderDraft),
}

/// The selections to send when placing an offer order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferOrderDraft {
    pub offer_id: OfferId,
    pub buy_item_ids: Vec<ProductId>,
    pub free_item_ids: Vec<ProductId>,
}

/// A rejected transition. Nothing changed and nothing was sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("{event} is not possible while {state}")]
    NotAllowed {
        event: &'static str,
        state: OfferState,
    },

    #[error("Size {0} is not offered")]
    UnknownSize(SizeId),

    #[error("Item {0} is not part of this offer")]
    OutOfScope(ProductId),

    #[error("Item {0} is not available")]
    Unavailable(ProductId),

    #[error("You can only choose {limit} items")]
    LimitReached { limit: u32 },

    #[error("Item {0} is not selected")]
    NotSelected(ProductId),

    #[error("Choose {buy_remaining} more items to buy and {free_remaining} more free items")]
    Incomplete {
        buy_remaining: u32,
        free_remaining: u32,
    },
}

impl From<TransitionError> for SessionError {
    fn from(err: TransitionError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Immutable snapshot of a redemption in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferMachine {
    offer: Offer,
    state: OfferState,
    size_id: Option<SizeId>,
    buy_items: Vec<CatalogItem>,
    free_items: Vec<CatalogItem>,
    last_error: Option<String>,
}

impl OfferMachine {
    /// Start a redemption of `offer` with nothing selected.
    #[must_use]
    pub const fn new(offer: Offer) -> Self {
        Self {
            offer,
            state: OfferState::SelectingSize,
            size_id: None,
            buy_items: Vec::new(),
            free_items: Vec::new(),
            last_error: None,
        }
    }

    /// Apply `event`, returning the next machine and any work to perform.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` if a guard rejects the event.
    pub fn transition(
        &self,
        event: OfferEvent,
    ) -> Result<(Self, Option<OfferEffect>), TransitionError> {
        let not_allowed = TransitionError::NotAllowed {
            event: event.name(),
            state: self.state,
        };
        let mut next = self.clone();

        let effect = match (self.state, event) {
            (OfferState::SelectingSize, OfferEvent::SelectSize(size_id)) => {
                if !self.offer.sizes.iter().any(|s| s.id == size_id) {
                    return Err(TransitionError::UnknownSize(size_id));
                }
                next.size_id = Some(size_id);
                next.state = OfferState::SelectingBuyItems;
                Some(self.lookup(size_id, CatalogPurpose::Buy))
            }

            (OfferState::SelectingBuyItems, OfferEvent::SelectBuyItem(item)) => {
                self.check_item(&item)?;
                if self.buy_remaining() == 0 {
                    return Err(TransitionError::LimitReached {
                        limit: self.offer.buy_quantity,
                    });
                }
                next.buy_items.push(item);
                None
            }

            (
                OfferState::SelectingBuyItems | OfferState::SelectingFreeItems,
                OfferEvent::RemoveBuyItem(product_id),
            ) => {
                remove_first(&mut next.buy_items, product_id)?;
                // The buy selection is no longer complete.
                next.state = OfferState::SelectingBuyItems;
                None
            }

            (OfferState::SelectingBuyItems, OfferEvent::AdvanceToFreeItems) => {
                if self.buy_remaining() > 0 {
                    return Err(TransitionError::Incomplete {
                        buy_remaining: self.buy_remaining(),
                        free_remaining: self.free_remaining(),
                    });
                }
                next.state = OfferState::SelectingFreeItems;
                match self.size_id {
                    Some(size_id) if self.offer.free_quantity > 0 => {
                        Some(self.lookup(size_id, CatalogPurpose::Free))
                    }
                    _ => None,
                }
            }

            (OfferState::SelectingFreeItems, OfferEvent::SelectFreeItem(item)) => {
                self.check_item(&item)?;
                if self.free_remaining() == 0 {
                    return Err(TransitionError::LimitReached {
                        limit: self.offer.free_quantity,
                    });
                }
                next.free_items.push(item);
                None
            }

            (OfferState::SelectingFreeItems, OfferEvent::RemoveFreeItem(product_id)) => {
                remove_first(&mut next.free_items, product_id)?;
                None
            }

            (OfferState::SelectingFreeItems, OfferEvent::GoBackToBuyItems) => {
                next.state = OfferState::SelectingBuyItems;
                None
            }

            (OfferState::SelectingBuyItems, OfferEvent::GoBackToSize) => {
                next.state = OfferState::SelectingSize;
                next.size_id = None;
                next.buy_items.clear();
                next.free_items.clear();
                None
            }

            (OfferState::SelectingFreeItems, OfferEvent::Submit) => {
                if !self.can_submit() {
                    return Err(TransitionError::Incomplete {
                        buy_remaining: self.buy_remaining(),
                        free_remaining: self.free_remaining(),
                    });
                }
                next.state = OfferState::Submitting;
                next.last_error = None;
                Some(OfferEffect::SubmitOrder(OfferOrderDraft {
                    offer_id: self.offer.id,
                    buy_item_ids: self.buy_items.iter().map(|i| i.id).collect(),
                    free_item_ids: self.free_items.iter().map(|i| i.id).collect(),
                }))
            }

            (OfferState::Submitting, OfferEvent::SubmitSucceeded(order_id)) => {
                next.state = OfferState::Submitted { order_id };
                None
            }

            (OfferState::Submitting, OfferEvent::SubmitFailed(message)) => {
                next.state = OfferState::SelectingFreeItems;
                next.last_error = Some(message);
                None
            }

            _ => return Err(not_allowed),
        };

        Ok((next, effect))
    }

    const fn lookup(&self, size_id: SizeId, purpose: CatalogPurpose) -> OfferEffect {
        OfferEffect::LookupCatalog {
            category_id: self.offer.category_id,
            size_id,
            purpose,
        }
    }

    fn check_item(&self, item: &CatalogItem) -> Result<(), TransitionError> {
        if item.category_id != self.offer.category_id || Some(item.size_id) != self.size_id {
            return Err(TransitionError::OutOfScope(item.id));
        }
        if !item.available {
            return Err(TransitionError::Unavailable(item.id));
        }
        Ok(())
    }

    #[must_use]
    pub const fn offer(&self) -> &Offer {
        &self.offer
    }

    #[must_use]
    pub const fn state(&self) -> OfferState {
        self.state
    }

    #[must_use]
    pub const fn size_id(&self) -> Option<SizeId> {
        self.size_id
    }

    #[must_use]
    pub fn buy_items(&self) -> &[CatalogItem] {
        &self.buy_items
    }

    #[must_use]
    pub fn free_items(&self) -> &[CatalogItem] {
        &self.free_items
    }

    /// Items still to choose before the buy selection is complete.
    #[must_use]
    pub fn buy_remaining(&self) -> u32 {
        remaining(self.offer.buy_quantity, self.buy_items.len())
    }

    /// Free items still to choose.
    #[must_use]
    pub fn free_remaining(&self) -> u32 {
        remaining(self.offer.free_quantity, self.free_items.len())
    }

    /// Whether `Submit` would be accepted.
    #[must_use]
    pub fn can_submit(&self) -> bool {
        self.state == OfferState::SelectingFreeItems
            && self.buy_remaining() == 0
            && self.free_remaining() == 0
    }

    /// The backend's message from the last failed submission, verbatim.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The placed order, once submitted.
    #[must_use]
    pub const fn order_id(&self) -> Option<OrderId> {
        match self.state {
            OfferState::Submitted { order_id } => Some(order_id),
            _ => None,
        }
    }

    /// Category and size the current step picks items from.
    #[must_use]
    pub fn catalog_scope(&self) -> Option<(CategoryId, SizeId, CatalogPurpose)> {
        let purpose = match self.state {
            OfferState::SelectingBuyItems => CatalogPurpose::Buy,
            OfferState::SelectingFreeItems => CatalogPurpose::Free,
            _ => return None,
        };
        self.size_id
            .map(|size_id| (self.offer.category_id, size_id, purpose))
    }
}

fn remaining(target: u32, selected: usize) -> u32 {
    target.saturating_sub(u32::try_from(selected).unwrap_or(u32::MAX))
}

fn remove_first(items: &mut Vec<CatalogItem>, product_id: ProductId) -> Result<(), TransitionError> {
    let index = items
        .iter()
        .position(|i| i.id == product_id)
        .ok_or(TransitionError::NotSelected(product_id))?;
    items.remove(index);
    Ok(())
}
