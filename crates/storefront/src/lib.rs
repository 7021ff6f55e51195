//! Bitebox commerce session core.
//!
//! Client-side logic for the Bitebox food-ordering storefront: who the
//! shopper is, their optimistically synced cart, "buy B get F free" offer
//! redemption, checkout and payment verification. The backend REST API is
//! the source of truth for everything except the guest id and cached
//! payment verifications, which live in durable client storage.
//!
//! Start from [`state::SessionContext`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod config;
pub mod error;
pub mod identity;
pub mod offer;
pub mod services;
pub mod state;
pub mod storage;

pub use error::{Result, SessionError};
pub use state::SessionContext;
