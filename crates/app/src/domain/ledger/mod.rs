//! Usage Ledger
//!
//! Redemptions of vouchers against orders. Every mutation runs in one
//! transaction under the voucher's row lock so that counters, per-user limits
//! and the ledger rows never disagree.

mod errors;
pub mod records;
pub(crate) mod repository;
pub mod service;

pub use errors::UsageLedgerError;
pub use service::{MockUsageLedger, PgUsageLedger, UsageLedger};
