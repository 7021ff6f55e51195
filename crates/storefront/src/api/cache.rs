//! Cache types for catalog and offer responses.

use bitebox_core::{CategoryId, OfferId, SizeId};

use super::types::{CatalogItem, Offer};

/// Cache key for catalog lookups and offers.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Catalog {
        category_id: CategoryId,
        size_id: SizeId,
    },
    Offer(OfferId),
    Offers,
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Catalog(Vec<CatalogItem>),
    Offer(Box<Offer>),
    Offers(Vec<Offer>),
}
