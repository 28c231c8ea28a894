//! Checkout errors.

use sqlx::Error;
use thiserror::Error;
use vouchers::{
    discounts::DiscountError,
    eligibility::{EligibilityError, Ineligibility},
    lifecycle::VoucherStatus,
};

use crate::{database::is_lock_timeout, domain::ledger::UsageLedgerError};

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("voucher not found")]
    NotFound,

    #[error("voucher does not apply: {0}")]
    Ineligible(Ineligibility),

    #[error("unit price {0} is out of range")]
    InvalidPrice(u64),

    #[error("invalid order")]
    InvalidOrder(#[from] EligibilityError),

    #[error("discount could not be calculated")]
    Discount(#[from] DiscountError),

    #[error("voucher usage limit reached")]
    LimitExceeded,

    #[error("voucher already used the maximum number of times by this customer")]
    PerUserLimitExceeded,

    #[error("voucher is {status}")]
    Unavailable { status: VoucherStatus },

    #[error("order holds no reservation of this voucher")]
    NotReserved,

    #[error("voucher use is already confirmed")]
    AlreadyConfirmed,

    #[error("timed out waiting for voucher lock")]
    LockTimeout,

    #[error("storage error")]
    Sql(#[source] Error),
}

impl From<Error> for CheckoutError {
    fn from(error: Error) -> Self {
        if is_lock_timeout(&error) {
            return Self::LockTimeout;
        }

        Self::Sql(error)
    }
}

impl From<UsageLedgerError> for CheckoutError {
    fn from(error: UsageLedgerError) -> Self {
        match error {
            UsageLedgerError::NotFound => Self::NotFound,
            UsageLedgerError::NotReserved => Self::NotReserved,
            UsageLedgerError::AlreadyConfirmed => Self::AlreadyConfirmed,
            UsageLedgerError::LockTimeout => Self::LockTimeout,
            UsageLedgerError::Sql(error) => Self::Sql(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_row_stays_a_storage_error() {
        let error = CheckoutError::from(Error::RowNotFound);

        assert!(
            matches!(error, CheckoutError::Sql(Error::RowNotFound)),
            "expected Sql(RowNotFound), got {error:?}"
        );
    }

    #[test]
    fn ledger_not_found_maps_to_not_found() {
        let error = CheckoutError::from(UsageLedgerError::NotFound);

        assert!(
            matches!(error, CheckoutError::NotFound),
            "expected NotFound, got {error:?}"
        );
    }
}
