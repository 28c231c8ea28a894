//! Vouchers
//!
//! Pure voucher engine for a marketplace: voucher definitions and their
//! lifecycle, eligibility evaluation against an order, discount calculation and
//! multi-voucher stacking. Persistence and the usage ledgers live in the
//! application crate.

pub mod conditions;
pub mod discounts;
pub mod eligibility;
pub mod ids;
pub mod lifecycle;
pub mod stacking;
pub mod voucher;
