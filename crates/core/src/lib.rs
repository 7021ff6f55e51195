//! Bitebox Core - Shared types library.
//!
//! This crate provides common types used across all Bitebox components:
//! - `storefront` - Commerce session core (identity, cart, offers, payments)
//! - `cli` - Terminal host that drives the session core
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no storage access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, prices, guest identifiers, cart lines and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
