//! Usage Ledger Repository

use sqlx::{Postgres, Transaction, query, query_as, query_scalar};
use vouchers::{
    ids::{OrderUuid, UserUuid, VoucherUuid},
    lifecycle::VoucherStatus,
};

use crate::{database::try_u64_from_i64, domain::ledger::records::UsageRecord};

const FIND_USAGE_SQL: &str = include_str!("sql/find_usage.sql");
const LOCK_USAGE_SQL: &str = include_str!("sql/lock_usage.sql");
const COUNT_USER_USAGES_SQL: &str = include_str!("sql/count_user_usages.sql");
const INSERT_USAGE_SQL: &str = include_str!("sql/insert_usage.sql");
const INCREMENT_USED_COUNT_SQL: &str = include_str!("sql/increment_used_count.sql");
const DECREMENT_USED_COUNT_SQL: &str = include_str!("sql/decrement_used_count.sql");
const CONFIRM_USAGE_SQL: &str = include_str!("sql/confirm_usage.sql");
const DELETE_USAGE_SQL: &str = include_str!("sql/delete_usage.sql");

/// Counter and status of a voucher after a ledger write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UsageCounter {
    pub(crate) total_used_count: u64,
    pub(crate) status: VoucherStatus,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PgUsageRepository;

impl PgUsageRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn find_usage(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        voucher: VoucherUuid,
        order: OrderUuid,
    ) -> Result<Option<UsageRecord>, sqlx::Error> {
        query_as::<Postgres, UsageRecord>(FIND_USAGE_SQL)
            .bind(voucher.into_uuid())
            .bind(order.into_uuid())
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn lock_usage(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        voucher: VoucherUuid,
        order: OrderUuid,
    ) -> Result<Option<UsageRecord>, sqlx::Error> {
        query_as::<Postgres, UsageRecord>(LOCK_USAGE_SQL)
            .bind(voucher.into_uuid())
            .bind(order.into_uuid())
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn count_user_usages(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        voucher: VoucherUuid,
        user: UserUuid,
    ) -> Result<u64, sqlx::Error> {
        let count: i64 = query_scalar(COUNT_USER_USAGES_SQL)
            .bind(voucher.into_uuid())
            .bind(user.into_uuid())
            .fetch_one(&mut **tx)
            .await?;

        try_u64_from_i64(count, "count")
    }

    /// Insert a usage row, returning `None` when the order already has one.
    pub(crate) async fn insert_usage(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        voucher: VoucherUuid,
        order: OrderUuid,
        user: UserUuid,
    ) -> Result<Option<UsageRecord>, sqlx::Error> {
        query_as::<Postgres, UsageRecord>(INSERT_USAGE_SQL)
            .bind(voucher.into_uuid())
            .bind(order.into_uuid())
            .bind(user.into_uuid())
            .fetch_optional(&mut **tx)
            .await
    }

    /// Count one more use, depleting the voucher when it reaches its limit.
    pub(crate) async fn increment_used_count(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        voucher: VoucherUuid,
    ) -> Result<UsageCounter, sqlx::Error> {
        let row: (i64, String) = query_as(INCREMENT_USED_COUNT_SQL)
            .bind(voucher.into_uuid())
            .fetch_one(&mut **tx)
            .await?;

        counter(row)
    }

    /// Give back one use, reactivating a depleted voucher.
    pub(crate) async fn decrement_used_count(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        voucher: VoucherUuid,
    ) -> Result<UsageCounter, sqlx::Error> {
        let row: (i64, String) = query_as(DECREMENT_USED_COUNT_SQL)
            .bind(voucher.into_uuid())
            .fetch_one(&mut **tx)
            .await?;

        counter(row)
    }

    pub(crate) async fn confirm_usage(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        voucher: VoucherUuid,
        order: OrderUuid,
    ) -> Result<Option<UsageRecord>, sqlx::Error> {
        query_as::<Postgres, UsageRecord>(CONFIRM_USAGE_SQL)
            .bind(voucher.into_uuid())
            .bind(order.into_uuid())
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn delete_usage(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        voucher: VoucherUuid,
        order: OrderUuid,
    ) -> Result<u64, sqlx::Error> {
        let rows_affected = query(DELETE_USAGE_SQL)
            .bind(voucher.into_uuid())
            .bind(order.into_uuid())
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }
}

fn counter((total_used_count, status): (i64, String)) -> Result<UsageCounter, sqlx::Error> {
    Ok(UsageCounter {
        total_used_count: try_u64_from_i64(total_used_count, "total_used_count")?,
        status: status.parse().map_err(|e| sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: Box::new(e),
        })?,
    })
}
