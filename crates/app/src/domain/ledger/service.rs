//! Usage Ledger Service

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use tracing::{Span, info};
use vouchers::{
    ids::{OrderUuid, UserUuid, VoucherUuid},
    lifecycle::VoucherStatus,
};

use crate::{
    database::Db,
    domain::{
        ledger::{
            UsageLedgerError,
            records::{ReserveOutcome, UsageRecord},
            repository::PgUsageRepository,
        },
        vouchers::repository::PgVouchersRepository,
    },
};

#[derive(Debug, Clone)]
pub struct PgUsageLedger {
    db: Db,
    vouchers: PgVouchersRepository,
    usages: PgUsageRepository,
}

impl PgUsageLedger {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self {
            db,
            vouchers: PgVouchersRepository::new(),
            usages: PgUsageRepository::new(),
        }
    }
}

#[async_trait]
impl UsageLedger for PgUsageLedger {
    #[tracing::instrument(
        name = "ledger.service.reserve",
        skip(self),
        fields(
            voucher_uuid = %voucher,
            user_uuid = %user,
            order_uuid = %order,
            outcome = tracing::field::Empty,
            total_used_count = tracing::field::Empty
        ),
        err
    )]
    async fn reserve(
        &self,
        voucher: VoucherUuid,
        user: UserUuid,
        order: OrderUuid,
    ) -> Result<ReserveOutcome, UsageLedgerError> {
        let span = Span::current();

        let mut tx = self.db.begin_bounded_transaction().await?;

        let Some(record) = self.vouchers.lock_voucher(&mut tx, voucher).await? else {
            span.record("outcome", "not_found");
            return Ok(ReserveOutcome::NotFound);
        };

        if let Some(existing) = self.usages.find_usage(&mut tx, voucher, order).await? {
            span.record("outcome", "already_reserved");
            return Ok(ReserveOutcome::AlreadyReserved(existing));
        }

        match record.voucher.effective_status(Timestamp::now()) {
            VoucherStatus::Active => {}
            VoucherStatus::Depleted => {
                span.record("outcome", "limit_exceeded");
                return Ok(ReserveOutcome::LimitExceeded);
            }
            status => {
                span.record("outcome", "unavailable");
                return Ok(ReserveOutcome::Unavailable { status });
            }
        }

        let user_usage = self.usages.count_user_usages(&mut tx, voucher, user).await?;

        if user_usage >= record.voucher.terms.per_user_limit {
            span.record("outcome", "per_user_limit_exceeded");
            return Ok(ReserveOutcome::PerUserLimitExceeded);
        }

        // The row lock makes a conflict here impossible unless the order was
        // reserved by a transaction that committed before ours took the lock.
        let Some(usage) = self
            .usages
            .insert_usage(&mut tx, voucher, order, user)
            .await?
        else {
            let existing = self
                .usages
                .find_usage(&mut tx, voucher, order)
                .await?
                .ok_or(UsageLedgerError::NotReserved)?;

            span.record("outcome", "already_reserved");
            return Ok(ReserveOutcome::AlreadyReserved(existing));
        };

        let counter = self.usages.increment_used_count(&mut tx, voucher).await?;

        tx.commit().await?;

        span.record("outcome", "reserved");
        span.record("total_used_count", counter.total_used_count);

        info!(
            voucher_uuid = %voucher,
            order_uuid = %order,
            total_used_count = counter.total_used_count,
            "reserved voucher use"
        );

        if counter.status == VoucherStatus::Depleted {
            info!(voucher_uuid = %voucher, "voucher depleted");
        }

        Ok(ReserveOutcome::Reserved(usage))
    }

    #[tracing::instrument(
        name = "ledger.service.confirm",
        skip(self),
        fields(voucher_uuid = %voucher, order_uuid = %order),
        err
    )]
    async fn confirm(
        &self,
        voucher: VoucherUuid,
        order: OrderUuid,
    ) -> Result<UsageRecord, UsageLedgerError> {
        let mut tx = self.db.begin_bounded_transaction().await?;

        let usage = self
            .usages
            .confirm_usage(&mut tx, voucher, order)
            .await?
            .ok_or(UsageLedgerError::NotReserved)?;

        tx.commit().await?;

        info!(voucher_uuid = %voucher, order_uuid = %order, "confirmed voucher use");

        Ok(usage)
    }

    #[tracing::instrument(
        name = "ledger.service.release",
        skip(self),
        fields(
            voucher_uuid = %voucher,
            order_uuid = %order,
            total_used_count = tracing::field::Empty
        ),
        err
    )]
    async fn release(
        &self,
        voucher: VoucherUuid,
        order: OrderUuid,
    ) -> Result<UsageRecord, UsageLedgerError> {
        let mut tx = self.db.begin_bounded_transaction().await?;

        let before = self
            .vouchers
            .lock_voucher(&mut tx, voucher)
            .await?
            .ok_or(UsageLedgerError::NotFound)?
            .voucher
            .status;

        let usage = self
            .usages
            .lock_usage(&mut tx, voucher, order)
            .await?
            .ok_or(UsageLedgerError::NotReserved)?;

        if usage.is_confirmed() {
            return Err(UsageLedgerError::AlreadyConfirmed);
        }

        self.usages.delete_usage(&mut tx, voucher, order).await?;

        let counter = self.usages.decrement_used_count(&mut tx, voucher).await?;

        tx.commit().await?;

        Span::current().record("total_used_count", counter.total_used_count);

        info!(voucher_uuid = %voucher, order_uuid = %order, "released voucher use");

        if before == VoucherStatus::Depleted && counter.status == VoucherStatus::Active {
            info!(voucher_uuid = %voucher, "voucher reactivated after release");
        }

        Ok(usage)
    }

    #[tracing::instrument(
        name = "ledger.service.get_usage",
        skip(self),
        fields(voucher_uuid = %voucher, order_uuid = %order),
        err
    )]
    async fn get_usage(
        &self,
        voucher: VoucherUuid,
        order: OrderUuid,
    ) -> Result<Option<UsageRecord>, UsageLedgerError> {
        let mut tx = self.db.begin_transaction().await?;

        let usage = self.usages.find_usage(&mut tx, voucher, order).await?;

        tx.commit().await?;

        Ok(usage)
    }
}

#[automock]
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Record a use of `voucher` by `user` on `order`.
    ///
    /// Limits are re-checked under the voucher's row lock. Reserving the same
    /// order twice returns the existing record without counting it again.
    async fn reserve(
        &self,
        voucher: VoucherUuid,
        user: UserUuid,
        order: OrderUuid,
    ) -> Result<ReserveOutcome, UsageLedgerError>;

    /// Mark the order's use as final. Idempotent.
    async fn confirm(
        &self,
        voucher: VoucherUuid,
        order: OrderUuid,
    ) -> Result<UsageRecord, UsageLedgerError>;

    /// Undo an unconfirmed reservation, returning its use to the voucher.
    async fn release(
        &self,
        voucher: VoucherUuid,
        order: OrderUuid,
    ) -> Result<UsageRecord, UsageLedgerError>;

    async fn get_usage(
        &self,
        voucher: VoucherUuid,
        order: OrderUuid,
    ) -> Result<Option<UsageRecord>, UsageLedgerError>;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use testresult::TestResult;
    use tokio::task::JoinSet;

    use crate::{
        domain::vouchers::VouchersService,
        test::{
            TestContext,
            helpers::{admin, create_voucher, fixed_terms},
        },
    };

    use super::*;

    async fn limited_voucher(
        ctx: &TestContext,
        code: &str,
        total_usage_limit: Option<u64>,
        per_user_limit: u64,
    ) -> TestResult<VoucherUuid> {
        let mut terms = fixed_terms(1_000);
        terms.total_usage_limit = total_usage_limit;
        terms.per_user_limit = per_user_limit;

        Ok(create_voucher(ctx, code, terms).await?.voucher.uuid)
    }

    async fn used_count(ctx: &TestContext, voucher: VoucherUuid) -> TestResult<i64> {
        Ok(
            sqlx::query_scalar("SELECT total_used_count FROM vouchers WHERE uuid = $1")
                .bind(voucher.into_uuid())
                .fetch_one(ctx.db.pool())
                .await?,
        )
    }

    async fn usage_rows(ctx: &TestContext, voucher: VoucherUuid) -> TestResult<i64> {
        Ok(
            sqlx::query_scalar("SELECT count(*) FROM voucher_usages WHERE voucher_uuid = $1")
                .bind(voucher.into_uuid())
                .fetch_one(ctx.db.pool())
                .await?,
        )
    }

    #[tokio::test]
    async fn reserve_records_usage_and_counts_it() -> TestResult {
        let ctx = TestContext::new().await;
        let voucher = limited_voucher(&ctx, "RESERVE", Some(10), 1).await?;
        let user = UserUuid::new();
        let order = OrderUuid::new();

        let outcome = ctx.ledger.reserve(voucher, user, order).await?;

        let ReserveOutcome::Reserved(record) = outcome else {
            return Err(format!("expected Reserved, got {outcome:?}").into());
        };

        assert_eq!(record.voucher, voucher);
        assert_eq!(record.user, user);
        assert_eq!(record.order, order);
        assert!(!record.is_confirmed());
        assert_eq!(used_count(&ctx, voucher).await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn reserving_same_order_twice_counts_once() -> TestResult {
        let ctx = TestContext::new().await;
        let voucher = limited_voucher(&ctx, "IDEMPOTENT", Some(10), 5).await?;
        let user = UserUuid::new();
        let order = OrderUuid::new();

        let first = ctx.ledger.reserve(voucher, user, order).await?;
        let second = ctx.ledger.reserve(voucher, user, order).await?;

        assert!(
            matches!(first, ReserveOutcome::Reserved(_)),
            "expected Reserved, got {first:?}"
        );
        assert!(
            matches!(second, ReserveOutcome::AlreadyReserved(_)),
            "expected AlreadyReserved, got {second:?}"
        );
        assert_eq!(first.record(), second.record());
        assert_eq!(used_count(&ctx, voucher).await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn concurrent_reserves_never_exceed_limit() -> TestResult {
        const LIMIT: u64 = 5;
        const ATTEMPTS: usize = 20;

        let ctx = TestContext::new().await;
        let voucher = limited_voucher(&ctx, "FLASHSALE", Some(LIMIT), 1).await?;

        let mut set = JoinSet::new();

        for _ in 0..ATTEMPTS {
            let ledger = ctx.ledger.clone();

            set.spawn(async move {
                ledger
                    .reserve(voucher, UserUuid::new(), OrderUuid::new())
                    .await
            });
        }

        let mut reserved = 0;
        let mut exceeded = 0;

        while let Some(result) = set.join_next().await {
            match result?? {
                ReserveOutcome::Reserved(_) => reserved += 1,
                ReserveOutcome::LimitExceeded => exceeded += 1,
                other => return Err(format!("unexpected outcome {other:?}").into()),
            }
        }

        assert_eq!(reserved, LIMIT);
        assert_eq!(exceeded, ATTEMPTS as u64 - LIMIT);
        assert_eq!(used_count(&ctx, voucher).await?, 5);
        assert_eq!(usage_rows(&ctx, voucher).await?, 5);

        Ok(())
    }

    #[tokio::test]
    async fn concurrent_reserves_by_one_user_respect_per_user_limit() -> TestResult {
        const PER_USER: u64 = 2;
        const ATTEMPTS: usize = 8;

        let ctx = TestContext::new().await;
        let voucher = limited_voucher(&ctx, "PERUSER", None, PER_USER).await?;
        let user = UserUuid::new();

        let mut set = JoinSet::new();

        for _ in 0..ATTEMPTS {
            let ledger = ctx.ledger.clone();

            set.spawn(async move { ledger.reserve(voucher, user, OrderUuid::new()).await });
        }

        let mut reserved = 0;
        let mut rejected = 0;

        while let Some(result) = set.join_next().await {
            match result?? {
                ReserveOutcome::Reserved(_) => reserved += 1,
                ReserveOutcome::PerUserLimitExceeded => rejected += 1,
                other => return Err(format!("unexpected outcome {other:?}").into()),
            }
        }

        assert_eq!(reserved, PER_USER);
        assert_eq!(rejected, ATTEMPTS as u64 - PER_USER);

        Ok(())
    }

    #[tokio::test]
    async fn last_use_depletes_voucher() -> TestResult {
        let ctx = TestContext::new().await;
        let voucher = limited_voucher(&ctx, "LASTONE", Some(2), 1).await?;

        for _ in 0..2 {
            let outcome = ctx
                .ledger
                .reserve(voucher, UserUuid::new(), OrderUuid::new())
                .await?;

            assert!(
                matches!(outcome, ReserveOutcome::Reserved(_)),
                "expected Reserved, got {outcome:?}"
            );
        }

        let record = ctx.vouchers.get_voucher(voucher).await?;

        assert_eq!(record.voucher.status, VoucherStatus::Depleted);
        assert_eq!(
            record.voucher.effective_status(Timestamp::now()),
            VoucherStatus::Depleted
        );

        let outcome = ctx
            .ledger
            .reserve(voucher, UserUuid::new(), OrderUuid::new())
            .await?;

        assert_eq!(outcome, ReserveOutcome::LimitExceeded);

        Ok(())
    }

    #[tokio::test]
    async fn paused_and_unknown_vouchers_are_not_reserved() -> TestResult {
        let ctx = TestContext::new().await;
        let voucher = limited_voucher(&ctx, "PAUSEME", None, 1).await?;

        ctx.vouchers
            .set_status(admin(), voucher, VoucherStatus::Paused)
            .await?;

        assert_eq!(
            ctx.ledger
                .reserve(voucher, UserUuid::new(), OrderUuid::new())
                .await?,
            ReserveOutcome::Unavailable {
                status: VoucherStatus::Paused
            }
        );

        assert_eq!(
            ctx.ledger
                .reserve(VoucherUuid::new(), UserUuid::new(), OrderUuid::new())
                .await?,
            ReserveOutcome::NotFound
        );

        assert_eq!(used_count(&ctx, voucher).await?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn release_returns_the_use_and_reactivates() -> TestResult {
        let ctx = TestContext::new().await;
        let voucher = limited_voucher(&ctx, "GIVEBACK", Some(1), 1).await?;
        let order = OrderUuid::new();

        ctx.ledger.reserve(voucher, UserUuid::new(), order).await?;

        assert_eq!(
            ctx.vouchers.get_voucher(voucher).await?.voucher.status,
            VoucherStatus::Depleted
        );

        let released = ctx.ledger.release(voucher, order).await?;

        assert_eq!(released.order, order);
        assert_eq!(used_count(&ctx, voucher).await?, 0);
        assert_eq!(usage_rows(&ctx, voucher).await?, 0);
        assert_eq!(
            ctx.vouchers.get_voucher(voucher).await?.voucher.status,
            VoucherStatus::Active
        );
        assert_eq!(ctx.ledger.get_usage(voucher, order).await?, None);

        let result = ctx.ledger.release(voucher, order).await;

        assert!(
            matches!(result, Err(UsageLedgerError::NotReserved)),
            "expected NotReserved, got {result:?}"
        );

        let outcome = ctx
            .ledger
            .reserve(voucher, UserUuid::new(), OrderUuid::new())
            .await?;

        assert!(
            matches!(outcome, ReserveOutcome::Reserved(_)),
            "expected Reserved, got {outcome:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn confirmed_use_cannot_be_released() -> TestResult {
        let ctx = TestContext::new().await;
        let voucher = limited_voucher(&ctx, "CONFIRMED", Some(3), 1).await?;
        let order = OrderUuid::new();

        ctx.ledger.reserve(voucher, UserUuid::new(), order).await?;

        let first = ctx.ledger.confirm(voucher, order).await?;
        let second = ctx.ledger.confirm(voucher, order).await?;

        assert!(first.is_confirmed());
        assert_eq!(first.confirmed_at, second.confirmed_at);

        let result = ctx.ledger.release(voucher, order).await;

        assert!(
            matches!(result, Err(UsageLedgerError::AlreadyConfirmed)),
            "expected AlreadyConfirmed, got {result:?}"
        );
        assert_eq!(used_count(&ctx, voucher).await?, 1);

        let result = ctx.ledger.confirm(voucher, OrderUuid::new()).await;

        assert!(
            matches!(result, Err(UsageLedgerError::NotReserved)),
            "expected NotReserved, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn lock_wait_is_bounded() -> TestResult {
        let ctx = TestContext::new().await;
        let voucher = limited_voucher(&ctx, "CONTENDED", None, 1).await?;

        let mut holder = ctx.db.pool().begin().await?;

        sqlx::query("SELECT 1 FROM vouchers WHERE uuid = $1 FOR UPDATE")
            .bind(voucher.into_uuid())
            .execute(&mut *holder)
            .await?;

        let impatient =
            PgUsageLedger::new(ctx.app_db.clone().with_lock_timeout(Duration::from_millis(100)));

        let result = impatient
            .reserve(voucher, UserUuid::new(), OrderUuid::new())
            .await;

        assert!(
            matches!(result, Err(UsageLedgerError::LockTimeout)),
            "expected LockTimeout, got {result:?}"
        );
        assert!(result.is_err_and(|error| error.is_retryable()));

        holder.rollback().await?;

        Ok(())
    }
}
