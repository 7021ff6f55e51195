//! Order placement and payment services.
//!
//! # Services
//!
//! - `checkout` - Places a cart order and starts online payment for guests
//! - `payment` - Verifies external payment sessions with a durable cache

mod checkout;
mod payment;

pub use checkout::{CheckoutService, OrderPlacement};
pub use payment::{PaymentVerificationRecord, PaymentVerifier, VerificationResult};
