//! Collections service errors.

use sqlx::Error;
use thiserror::Error;

use crate::database::is_lock_timeout;

#[derive(Debug, Error)]
pub enum CollectionsError {
    #[error("timed out waiting for voucher lock")]
    LockTimeout,

    #[error("storage error")]
    Sql(#[source] Error),
}

impl From<Error> for CollectionsError {
    fn from(error: Error) -> Self {
        if is_lock_timeout(&error) {
            return Self::LockTimeout;
        }

        Self::Sql(error)
    }
}
