//! Voucher Domain Concerns

pub mod authorization;
pub mod checkout;
pub mod collections;
pub mod customers;
pub mod ledger;
pub mod vouchers;
