//! Collections Service

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use tracing::{Span, info};
use vouchers::{
    ids::{UserUuid, VoucherUuid},
    lifecycle::VoucherStatus,
};

use crate::{
    database::Db,
    domain::{
        collections::{
            CollectionsError,
            records::{CollectOutcome, CollectionRecord},
            repository::PgCollectionsRepository,
        },
        vouchers::repository::PgVouchersRepository,
    },
};

#[derive(Debug, Clone)]
pub struct PgCollectionsService {
    db: Db,
    vouchers: PgVouchersRepository,
    collections: PgCollectionsRepository,
}

impl PgCollectionsService {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self {
            db,
            vouchers: PgVouchersRepository::new(),
            collections: PgCollectionsRepository::new(),
        }
    }
}

#[async_trait]
impl CollectionsService for PgCollectionsService {
    #[tracing::instrument(
        name = "collections.service.collect",
        skip(self),
        fields(
            voucher_uuid = %voucher,
            user_uuid = %user,
            outcome = tracing::field::Empty
        ),
        err
    )]
    async fn collect(
        &self,
        voucher: VoucherUuid,
        user: UserUuid,
    ) -> Result<CollectOutcome, CollectionsError> {
        let span = Span::current();

        let mut tx = self.db.begin_bounded_transaction().await?;

        let Some(record) = self.vouchers.lock_voucher(&mut tx, voucher).await? else {
            span.record("outcome", "not_found");
            return Ok(CollectOutcome::NotFound);
        };

        if let Some(existing) = self
            .collections
            .find_collection(&mut tx, voucher, user)
            .await?
        {
            span.record("outcome", "already_collected");
            return Ok(CollectOutcome::AlreadyCollected(existing));
        }

        if !record.voucher.terms.collection_type.is_collectable() {
            span.record("outcome", "not_collectable");
            return Ok(CollectOutcome::NotCollectable);
        }

        let status = record.voucher.effective_status(Timestamp::now());

        if status != VoucherStatus::Active {
            span.record("outcome", "unavailable");
            return Ok(CollectOutcome::Unavailable { status });
        }

        if record.voucher.collection_exhausted() {
            span.record("outcome", "limit_exceeded");
            return Ok(CollectOutcome::LimitExceeded);
        }

        let Some(collection) = self
            .collections
            .insert_collection(&mut tx, voucher, user)
            .await?
        else {
            span.record("outcome", "already_collected");

            return Ok(
                match self
                    .collections
                    .find_collection(&mut tx, voucher, user)
                    .await?
                {
                    Some(existing) => CollectOutcome::AlreadyCollected(existing),
                    None => CollectOutcome::NotFound,
                },
            );
        };

        let collected_count = self
            .collections
            .increment_collected_count(&mut tx, voucher)
            .await?;

        tx.commit().await?;

        span.record("outcome", "collected");

        info!(voucher_uuid = %voucher, user_uuid = %user, collected_count, "collected voucher");

        Ok(CollectOutcome::Collected(collection))
    }

    #[tracing::instrument(
        name = "collections.service.list_collections",
        skip(self),
        fields(user_uuid = %user),
        err
    )]
    async fn list_collections(
        &self,
        user: UserUuid,
    ) -> Result<Vec<CollectionRecord>, CollectionsError> {
        let mut tx = self.db.begin_transaction().await?;

        let collections = self.collections.list_user_collections(&mut tx, user).await?;

        tx.commit().await?;

        Ok(collections)
    }
}

#[automock]
#[async_trait]
pub trait CollectionsService: Send + Sync {
    /// Claim `voucher` for `user`. Claiming twice returns the first claim.
    async fn collect(
        &self,
        voucher: VoucherUuid,
        user: UserUuid,
    ) -> Result<CollectOutcome, CollectionsError>;

    /// Vouchers `user` has claimed, most recent first.
    async fn list_collections(
        &self,
        user: UserUuid,
    ) -> Result<Vec<CollectionRecord>, CollectionsError>;
}
