//! Vouchers Data

use vouchers::{ids::VoucherUuid, lifecycle::VoucherStatus, voucher::VoucherTerms};

/// New Voucher Data
#[derive(Debug, Clone, PartialEq)]
pub struct NewVoucher {
    pub uuid: VoucherUuid,

    /// Raw code as entered; normalised on creation.
    pub code: String,

    /// `Draft` or `Active`.
    pub status: VoucherStatus,

    pub terms: VoucherTerms,
}

impl NewVoucher {
    #[must_use]
    pub fn new(code: impl Into<String>, status: VoucherStatus, terms: VoucherTerms) -> Self {
        Self {
            uuid: VoucherUuid::new(),
            code: code.into(),
            status,
            terms,
        }
    }
}

/// Voucher Update Data
///
/// Replaces the editable terms. The scope must match the stored voucher.
#[derive(Debug, Clone, PartialEq)]
pub struct VoucherUpdate {
    pub terms: VoucherTerms,
}
