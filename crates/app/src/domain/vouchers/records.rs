//! Voucher Records

use jiff::Timestamp;
use vouchers::{ids::UserUuid, voucher::Voucher};

/// Voucher Record
#[derive(Debug, Clone, PartialEq)]
pub struct VoucherRecord {
    pub voucher: Voucher,
    pub created_by: UserUuid,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
