//! Test Helpers

use jiff::{SignedDuration, Timestamp};
use vouchers::{
    ids::UserUuid,
    lifecycle::VoucherStatus,
    voucher::{DiscountKind, DiscountTerms, VoucherTerms},
};

use crate::{
    domain::{
        authorization::Principal,
        vouchers::{
            VouchersService, VouchersServiceError, data::NewVoucher, records::VoucherRecord,
        },
    },
    test::TestContext,
};

/// Current time truncated to whole seconds, so it survives a database round trip.
pub(crate) fn now() -> Timestamp {
    let now = Timestamp::now();

    now - SignedDuration::from_nanos(i64::from(now.subsec_nanosecond()))
}

pub(crate) fn admin() -> Principal {
    Principal::platform_admin(UserUuid::new())
}

fn terms(discount: DiscountTerms) -> VoucherTerms {
    let now = now();

    VoucherTerms::new(
        discount,
        now - SignedDuration::from_hours(24),
        now + SignedDuration::from_hours(24 * 30),
    )
}

/// Platform terms for a fixed discount, valid from yesterday for a month.
pub(crate) fn fixed_terms(value: u64) -> VoucherTerms {
    terms(DiscountTerms {
        kind: DiscountKind::Fixed,
        value,
        max_discount_amount: None,
    })
}

pub(crate) fn percentage_terms(percent: u64, max_discount_amount: Option<u64>) -> VoucherTerms {
    terms(DiscountTerms {
        kind: DiscountKind::Percentage,
        value: percent,
        max_discount_amount,
    })
}

/// Create an active voucher as a platform admin.
pub(crate) async fn create_voucher(
    ctx: &TestContext,
    code: &str,
    terms: VoucherTerms,
) -> Result<VoucherRecord, VouchersServiceError> {
    ctx.vouchers
        .create_voucher(admin(), NewVoucher::new(code, VoucherStatus::Active, terms))
        .await
}
