//! Authorization
//!
//! Voucher administration is checked against an [`Authority`] capability held by
//! the already-authenticated caller. Store owners may only manage vouchers scoped
//! to a store they own.

use thiserror::Error;
use vouchers::{ids::UserUuid, voucher::VoucherScope};

mod ownership;

pub use ownership::{MockStoreOwnership, PgStoreOwnership, StoreOwnership};

/// What the caller is allowed to administer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Manages every voucher.
    PlatformAdmin,

    /// Manages vouchers of stores they own.
    StoreOwner,
}

/// Authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user: UserUuid,
    pub authority: Authority,
}

impl Principal {
    #[must_use]
    pub const fn platform_admin(user: UserUuid) -> Self {
        Self {
            user,
            authority: Authority::PlatformAdmin,
        }
    }

    #[must_use]
    pub const fn store_owner(user: UserUuid) -> Self {
        Self {
            user,
            authority: Authority::StoreOwner,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthorizationError {
    #[error("not allowed to manage this voucher")]
    Forbidden,

    #[error("ownership lookup failed")]
    Lookup(#[source] sqlx::Error),
}

/// Check `principal` may manage a voucher with `scope`.
#[tracing::instrument(
    name = "authorization.authorize",
    skip(ownership),
    fields(user_uuid = %principal.user, authority = ?principal.authority),
    err
)]
pub async fn authorize(
    ownership: &dyn StoreOwnership,
    principal: Principal,
    scope: VoucherScope,
) -> Result<(), AuthorizationError> {
    match (principal.authority, scope) {
        (Authority::PlatformAdmin, _) => Ok(()),
        (Authority::StoreOwner, VoucherScope::Platform) => Err(AuthorizationError::Forbidden),
        (Authority::StoreOwner, VoucherScope::Store(store)) => {
            let owns = ownership
                .owns_store(principal.user, store)
                .await
                .map_err(AuthorizationError::Lookup)?;

            if owns {
                Ok(())
            } else {
                Err(AuthorizationError::Forbidden)
            }
        }
    }
}
