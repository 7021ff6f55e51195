//! Core types for Bitebox.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod guest;
pub mod id;
pub mod price;
pub mod status;

pub use cart::{CartLine, CartTotals, LineDisplay};
pub use guest::{GuestId, GuestIdError};
pub use id::*;
pub use price::{CurrencyCode, Price};
pub use status::*;
