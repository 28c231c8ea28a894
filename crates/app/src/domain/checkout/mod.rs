//! Checkout
//!
//! The surface checkout talks to: previews, redemption and the vouchers a
//! customer can use right now.

pub mod data;
mod errors;
pub mod service;

pub use errors::CheckoutError;
pub use service::{CheckoutService, MockCheckoutService, PgCheckoutService};
