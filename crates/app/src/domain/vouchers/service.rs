//! Vouchers Service
//!
//! Administration of voucher definitions by platform admins and store owners.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use sqlx::error::ErrorKind;
use tracing::{Span, info};
use vouchers::{
    ids::VoucherUuid,
    lifecycle::{VoucherStatus, reissued_status},
    voucher::{Voucher, VoucherCode},
};

use crate::{
    database::Db,
    domain::{
        authorization::{Principal, StoreOwnership, authorize},
        vouchers::{
            VouchersServiceError,
            data::{NewVoucher, VoucherUpdate},
            records::VoucherRecord,
            repository::PgVouchersRepository,
        },
    },
};

#[derive(Clone)]
pub struct PgVouchersService {
    db: Db,
    repository: PgVouchersRepository,
    ownership: Arc<dyn StoreOwnership>,
}

impl PgVouchersService {
    #[must_use]
    pub fn new(db: Db, ownership: Arc<dyn StoreOwnership>) -> Self {
        Self {
            db,
            repository: PgVouchersRepository::new(),
            ownership,
        }
    }
}

impl fmt::Debug for PgVouchersService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgVouchersService")
            .field("db", &self.db)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl VouchersService for PgVouchersService {
    #[tracing::instrument(
        name = "vouchers.service.create_voucher",
        skip(self, voucher),
        fields(
            user_uuid = %principal.user,
            voucher_uuid = %voucher.uuid,
            voucher_code = tracing::field::Empty,
            status = %voucher.status
        ),
        err
    )]
    async fn create_voucher(
        &self,
        principal: Principal,
        voucher: NewVoucher,
    ) -> Result<VoucherRecord, VouchersServiceError> {
        let code = VoucherCode::parse(&voucher.code)?;

        Span::current().record("voucher_code", tracing::field::display(&code));

        voucher.terms.validate()?;

        if !voucher.status.is_initial() {
            return Err(VouchersServiceError::InvalidInitialStatus(voucher.status));
        }

        authorize(self.ownership.as_ref(), principal, voucher.terms.scope).await?;

        let mut tx = self.db.begin_transaction().await?;

        let record = self
            .repository
            .create_voucher(
                &mut tx,
                voucher.uuid,
                &code,
                voucher.status,
                principal.user,
                &voucher.terms,
            )
            .await?;

        tx.commit().await?;

        info!(voucher_uuid = %record.voucher.uuid, voucher_code = %code, "created voucher");

        Ok(record)
    }

    #[tracing::instrument(
        name = "vouchers.service.update_voucher",
        skip(self, update),
        fields(
            user_uuid = %principal.user,
            voucher_uuid = %uuid,
            limits_changed = tracing::field::Empty,
            status = tracing::field::Empty
        ),
        err
    )]
    async fn update_voucher(
        &self,
        principal: Principal,
        uuid: VoucherUuid,
        update: VoucherUpdate,
        now: Timestamp,
    ) -> Result<VoucherRecord, VouchersServiceError> {
        let mut tx = self.db.begin_bounded_transaction().await?;

        let current = self
            .repository
            .lock_voucher(&mut tx, uuid)
            .await?
            .ok_or(VouchersServiceError::NotFound)?
            .voucher;

        authorize(self.ownership.as_ref(), principal, current.terms.scope).await?;

        if update.terms.scope != current.terms.scope {
            return Err(VouchersServiceError::ScopeImmutable);
        }

        update.terms.validate()?;

        if update
            .terms
            .total_usage_limit
            .is_some_and(|limit| limit < current.total_used_count)
        {
            return Err(VouchersServiceError::LimitBelowUsage {
                used: current.total_used_count,
            });
        }

        let limits_changed = update.terms.total_usage_limit != current.terms.total_usage_limit
            || update.terms.ends_at != current.terms.ends_at;

        let edited = Voucher {
            terms: update.terms,
            ..current.clone()
        };

        let status = match reissued_status(current.status, limits_changed, &edited, now) {
            VoucherStatus::Active if edited.usage_exhausted() => VoucherStatus::Depleted,
            status => status,
        };

        let span = Span::current();

        span.record("limits_changed", limits_changed);
        span.record("status", tracing::field::display(status));

        let record = self
            .repository
            .update_terms(&mut tx, uuid, status, &edited.terms)
            .await?;

        tx.commit().await?;

        if status != current.status {
            info!(
                voucher_uuid = %uuid,
                from = %current.status,
                to = %status,
                "voucher status changed by edit"
            );
        }

        info!(voucher_uuid = %uuid, "updated voucher");

        Ok(record)
    }

    #[tracing::instrument(
        name = "vouchers.service.set_status",
        skip(self),
        fields(user_uuid = %principal.user, voucher_uuid = %uuid, status = %status),
        err
    )]
    async fn set_status(
        &self,
        principal: Principal,
        uuid: VoucherUuid,
        status: VoucherStatus,
    ) -> Result<VoucherRecord, VouchersServiceError> {
        let mut tx = self.db.begin_bounded_transaction().await?;

        let current = self
            .repository
            .lock_voucher(&mut tx, uuid)
            .await?
            .ok_or(VouchersServiceError::NotFound)?
            .voucher;

        authorize(self.ownership.as_ref(), principal, current.terms.scope).await?;

        let status = current.status.transition(status)?;

        let record = self.repository.set_status(&mut tx, uuid, status).await?;

        tx.commit().await?;

        info!(voucher_uuid = %uuid, from = %current.status, to = %status, "set voucher status");

        Ok(record)
    }

    #[tracing::instrument(
        name = "vouchers.service.delete_voucher",
        skip(self),
        fields(user_uuid = %principal.user, voucher_uuid = %uuid),
        err
    )]
    async fn delete_voucher(
        &self,
        principal: Principal,
        uuid: VoucherUuid,
    ) -> Result<(), VouchersServiceError> {
        let mut tx = self.db.begin_bounded_transaction().await?;

        let current = self
            .repository
            .lock_voucher(&mut tx, uuid)
            .await?
            .ok_or(VouchersServiceError::NotFound)?
            .voucher;

        authorize(self.ownership.as_ref(), principal, current.terms.scope).await?;

        if self.repository.count_usages(&mut tx, uuid).await? > 0 {
            return Err(VouchersServiceError::InUse);
        }

        let rows_affected = self
            .repository
            .delete_voucher(&mut tx, uuid)
            .await
            .map_err(|error| match error.as_database_error().map(|db| db.kind()) {
                Some(ErrorKind::ForeignKeyViolation) => VouchersServiceError::InUse,
                _ => VouchersServiceError::from(error),
            })?;

        if rows_affected == 0 {
            return Err(VouchersServiceError::NotFound);
        }

        tx.commit().await?;

        info!(voucher_uuid = %uuid, "deleted voucher");

        Ok(())
    }

    #[tracing::instrument(
        name = "vouchers.service.get_voucher",
        skip(self),
        fields(voucher_uuid = %uuid),
        err
    )]
    async fn get_voucher(&self, uuid: VoucherUuid) -> Result<VoucherRecord, VouchersServiceError> {
        let mut tx = self.db.begin_transaction().await?;

        let record = self
            .repository
            .get_voucher(&mut tx, uuid)
            .await?
            .ok_or(VouchersServiceError::NotFound)?;

        tx.commit().await?;

        Ok(record)
    }

    #[tracing::instrument(name = "vouchers.service.find_by_code", skip(self), err)]
    async fn find_by_code(&self, code: &str) -> Result<VoucherRecord, VouchersServiceError> {
        // A code that cannot be valid cannot exist either.
        let Ok(code) = VoucherCode::parse(code) else {
            return Err(VouchersServiceError::NotFound);
        };

        let mut tx = self.db.begin_transaction().await?;

        let record = self
            .repository
            .find_by_code(&mut tx, &code)
            .await?
            .ok_or(VouchersServiceError::NotFound)?;

        tx.commit().await?;

        Ok(record)
    }
}

#[automock]
#[async_trait]
pub trait VouchersService: Send + Sync {
    /// Create a voucher in `Draft` or `Active` status.
    async fn create_voucher(
        &self,
        principal: Principal,
        voucher: NewVoucher,
    ) -> Result<VoucherRecord, VouchersServiceError>;

    /// Replace a voucher's editable terms.
    ///
    /// Changing the usage limit or end date of a depleted or expired voucher
    /// re-issues it when the new terms make it usable at `now`.
    async fn update_voucher(
        &self,
        principal: Principal,
        uuid: VoucherUuid,
        update: VoucherUpdate,
        now: Timestamp,
    ) -> Result<VoucherRecord, VouchersServiceError>;

    /// Move a voucher between `Draft`, `Active` and `Paused`.
    async fn set_status(
        &self,
        principal: Principal,
        uuid: VoucherUuid,
        status: VoucherStatus,
    ) -> Result<VoucherRecord, VouchersServiceError>;

    /// Delete a voucher that has never been redeemed.
    async fn delete_voucher(
        &self,
        principal: Principal,
        uuid: VoucherUuid,
    ) -> Result<(), VouchersServiceError>;

    async fn get_voucher(&self, uuid: VoucherUuid) -> Result<VoucherRecord, VouchersServiceError>;

    /// Look a voucher up by code, case-insensitively.
    async fn find_by_code(&self, code: &str) -> Result<VoucherRecord, VouchersServiceError>;
}
