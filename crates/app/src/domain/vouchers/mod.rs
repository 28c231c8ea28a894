//! Vouchers

pub mod data;
pub mod documents;
mod errors;
pub mod records;
pub(crate) mod repository;
pub mod service;

pub use errors::VouchersServiceError;
pub use service::{MockVouchersService, PgVouchersService, VouchersService};
