//! Usage ledger errors.

use sqlx::Error;
use thiserror::Error;

use crate::database::is_lock_timeout;

#[derive(Debug, Error)]
pub enum UsageLedgerError {
    #[error("voucher not found")]
    NotFound,

    #[error("order holds no reservation of this voucher")]
    NotReserved,

    #[error("usage is confirmed and cannot be released")]
    AlreadyConfirmed,

    /// Retryable: another transaction held the voucher for too long.
    #[error("timed out waiting for voucher lock")]
    LockTimeout,

    #[error("storage error")]
    Sql(#[source] Error),
}

impl UsageLedgerError {
    /// Whether the caller may retry the same request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout)
    }
}

impl From<Error> for UsageLedgerError {
    fn from(error: Error) -> Self {
        if is_lock_timeout(&error) {
            return Self::LockTimeout;
        }

        Self::Sql(error)
    }
}
