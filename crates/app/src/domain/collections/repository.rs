//! Collections Repository

use sqlx::{Postgres, Transaction, query_as, query_scalar};
use vouchers::ids::{UserUuid, VoucherUuid};

use crate::{database::try_u64_from_i64, domain::collections::records::CollectionRecord};

const FIND_COLLECTION_SQL: &str = include_str!("sql/find_collection.sql");
const INSERT_COLLECTION_SQL: &str = include_str!("sql/insert_collection.sql");
const INCREMENT_COLLECTED_COUNT_SQL: &str = include_str!("sql/increment_collected_count.sql");
const LIST_USER_COLLECTIONS_SQL: &str = include_str!("sql/list_user_collections.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgCollectionsRepository;

impl PgCollectionsRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn find_collection(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        voucher: VoucherUuid,
        user: UserUuid,
    ) -> Result<Option<CollectionRecord>, sqlx::Error> {
        query_as::<Postgres, CollectionRecord>(FIND_COLLECTION_SQL)
            .bind(voucher.into_uuid())
            .bind(user.into_uuid())
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn insert_collection(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        voucher: VoucherUuid,
        user: UserUuid,
    ) -> Result<Option<CollectionRecord>, sqlx::Error> {
        query_as::<Postgres, CollectionRecord>(INSERT_COLLECTION_SQL)
            .bind(voucher.into_uuid())
            .bind(user.into_uuid())
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn increment_collected_count(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        voucher: VoucherUuid,
    ) -> Result<u64, sqlx::Error> {
        let collected_count: i64 = query_scalar(INCREMENT_COLLECTED_COUNT_SQL)
            .bind(voucher.into_uuid())
            .fetch_one(&mut **tx)
            .await?;

        try_u64_from_i64(collected_count, "collected_count")
    }

    pub(crate) async fn list_user_collections(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: UserUuid,
    ) -> Result<Vec<CollectionRecord>, sqlx::Error> {
        query_as::<Postgres, CollectionRecord>(LIST_USER_COLLECTIONS_SQL)
            .bind(user.into_uuid())
            .fetch_all(&mut **tx)
            .await
    }
}
