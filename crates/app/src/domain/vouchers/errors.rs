//! Vouchers service errors.

use sqlx::{
    Error,
    error::{DatabaseError, ErrorKind},
};
use thiserror::Error;
use vouchers::{
    lifecycle::{LifecycleError, VoucherStatus},
    voucher::DefinitionError,
};

use crate::{database::is_lock_timeout, domain::authorization::AuthorizationError};

#[derive(Debug, Error)]
pub enum VouchersServiceError {
    #[error("voucher code already exists")]
    AlreadyExists,

    #[error("voucher not found")]
    NotFound,

    #[error("not allowed to manage this voucher")]
    Forbidden,

    #[error("voucher has been used and cannot be deleted")]
    InUse,

    #[error("invalid voucher definition")]
    InvalidDefinition(#[from] DefinitionError),

    #[error("invalid status change")]
    InvalidTransition(#[from] LifecycleError),

    #[error("vouchers cannot be created as {0}")]
    InvalidInitialStatus(VoucherStatus),

    #[error("voucher scope cannot be changed")]
    ScopeImmutable,

    #[error("usage limit is below the {used} redemptions already made")]
    LimitBelowUsage { used: u64 },

    #[error("related resource not found")]
    InvalidReference,

    #[error("missing required data")]
    MissingRequiredData,

    #[error("invalid data")]
    InvalidData,

    #[error("timed out waiting for voucher lock")]
    LockTimeout,

    #[error("storage error")]
    Sql(#[source] Error),
}

impl From<Error> for VouchersServiceError {
    fn from(error: Error) -> Self {
        if matches!(error, Error::RowNotFound) {
            return Self::NotFound;
        }

        if is_lock_timeout(&error) {
            return Self::LockTimeout;
        }

        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::UniqueViolation) => Self::AlreadyExists,
            Some(ErrorKind::ForeignKeyViolation) => Self::InvalidReference,
            Some(ErrorKind::NotNullViolation) => Self::MissingRequiredData,
            Some(ErrorKind::CheckViolation) => Self::InvalidData,
            _ => Self::Sql(error),
        }
    }
}

impl From<AuthorizationError> for VouchersServiceError {
    fn from(error: AuthorizationError) -> Self {
        match error {
            AuthorizationError::Forbidden => Self::Forbidden,
            AuthorizationError::Lookup(error) => Self::from(error),
        }
    }
}
