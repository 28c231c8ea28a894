//! Collections
//!
//! Users claiming manual and targeted vouchers into their wallet. Tracked
//! separately from redemptions: collecting a voucher never uses it.

mod errors;
pub mod records;
pub(crate) mod repository;
pub mod service;

pub use errors::CollectionsError;
pub use service::{CollectionsService, MockCollectionsService, PgCollectionsService};
