//! CLI command implementations.
//!
//! Output goes through `tracing` at info level, like every other message
//! the CLI prints.

pub mod cart;
pub mod checkout;
pub mod identity;
pub mod offers;
pub mod payment;
