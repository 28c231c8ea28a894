//! Checkout Service

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use rusty_money::iso::Currency;
use tracing::{Span, info};
use vouchers::{
    discounts::calculate_discount,
    eligibility::{CustomerFacts, Eligibility, evaluate},
    ids::{OrderUuid, StoreUuid, UserUuid, VoucherUuid},
    stacking,
    voucher::{Voucher, VoucherCode},
};

use crate::{
    database::Db,
    domain::{
        checkout::{
            CheckoutError,
            data::{ComposedQuote, OrderLine, Quote, RejectedVoucher, order_context},
        },
        customers::CustomerDirectory,
        ledger::{
            UsageLedger,
            records::{ReserveOutcome, UsageRecord},
            repository::PgUsageRepository,
        },
        vouchers::{records::VoucherRecord, repository::PgVouchersRepository},
    },
};

#[derive(Clone)]
pub struct PgCheckoutService {
    db: Db,
    vouchers: PgVouchersRepository,
    usages: PgUsageRepository,
    ledger: Arc<dyn UsageLedger>,
    customers: Arc<dyn CustomerDirectory>,
    currency: &'static Currency,
}

impl PgCheckoutService {
    #[must_use]
    pub fn new(
        db: Db,
        ledger: Arc<dyn UsageLedger>,
        customers: Arc<dyn CustomerDirectory>,
        currency: &'static Currency,
    ) -> Self {
        Self {
            db,
            vouchers: PgVouchersRepository::new(),
            usages: PgUsageRepository::new(),
            ledger,
            customers,
            currency,
        }
    }

    /// Look up each code with the user's usage of it.
    async fn load_vouchers(
        &self,
        codes: &[&str],
        user: UserUuid,
    ) -> Result<Vec<(Voucher, u64)>, CheckoutError> {
        let mut tx = self.db.begin_transaction().await?;
        let mut loaded = Vec::with_capacity(codes.len());

        for raw in codes {
            let code = VoucherCode::parse(raw).map_err(|_err| CheckoutError::NotFound)?;

            let voucher = self
                .vouchers
                .find_by_code(&mut tx, &code)
                .await?
                .ok_or(CheckoutError::NotFound)?
                .voucher;

            let usage = self
                .usages
                .count_user_usages(&mut tx, voucher.uuid, user)
                .await?;

            loaded.push((voucher, usage));
        }

        tx.commit().await?;

        Ok(loaded)
    }

    async fn customer_facts(&self, user: UserUuid) -> Result<CustomerFacts, CheckoutError> {
        let profile = self.customers.profile(user).await?;

        Ok(CustomerFacts {
            user,
            voucher_usage: 0,
            prior_completed_orders: profile.prior_completed_orders,
            tags: profile.tags,
        })
    }
}

impl fmt::Debug for PgCheckoutService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgCheckoutService")
            .field("db", &self.db)
            .field("currency", &self.currency.iso_alpha_code)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CheckoutService for PgCheckoutService {
    #[tracing::instrument(
        name = "checkout.service.validate",
        skip(self, lines),
        fields(
            user_uuid = %user,
            store_uuid = %store,
            line_count = lines.len(),
            voucher_uuid = tracing::field::Empty
        ),
        err
    )]
    async fn validate(
        &self,
        code: &str,
        user: UserUuid,
        store: StoreUuid,
        lines: Vec<OrderLine>,
        now: Timestamp,
    ) -> Result<Quote, CheckoutError> {
        let (voucher, voucher_usage) = self
            .load_vouchers(&[code], user)
            .await?
            .pop()
            .ok_or(CheckoutError::NotFound)?;

        Span::current().record("voucher_uuid", tracing::field::display(voucher.uuid));

        let customer = CustomerFacts {
            voucher_usage,
            ..self.customer_facts(user).await?
        };

        let order = order_context(store, self.currency, &lines)?;

        match evaluate(&voucher, &order, &customer, now)? {
            Eligibility::Eligible { subtotal } => {
                let discount = calculate_discount(&voucher.terms.discount, subtotal)?;

                Ok(Quote {
                    voucher,
                    subtotal,
                    discount,
                })
            }
            Eligibility::Ineligible { reason } => Err(CheckoutError::Ineligible(reason)),
        }
    }

    #[tracing::instrument(
        name = "checkout.service.compose",
        skip(self, codes, lines),
        fields(
            user_uuid = %user,
            store_uuid = %store,
            code_count = codes.len(),
            applied_count = tracing::field::Empty
        ),
        err
    )]
    async fn compose(
        &self,
        codes: Vec<String>,
        user: UserUuid,
        store: StoreUuid,
        lines: Vec<OrderLine>,
        now: Timestamp,
    ) -> Result<ComposedQuote, CheckoutError> {
        let codes: Vec<&str> = codes.iter().map(String::as_str).collect();

        let loaded = self.load_vouchers(&codes, user).await?;
        let customer = self.customer_facts(user).await?;
        let order = order_context(store, self.currency, &lines)?;
        let subtotal = order.subtotal()?;

        let mut eligible = Vec::with_capacity(loaded.len());
        let mut rejected = Vec::new();

        for (voucher, voucher_usage) in loaded {
            let facts = CustomerFacts {
                voucher_usage,
                ..customer.clone()
            };

            match evaluate(&voucher, &order, &facts, now)? {
                Eligibility::Eligible { .. } => eligible.push(voucher),
                Eligibility::Ineligible { reason } => {
                    rejected.push(RejectedVoucher { voucher, reason });
                }
            }
        }

        let refs: Vec<&Voucher> = eligible.iter().collect();
        let composition = stacking::compose(&refs, subtotal)?;

        Span::current().record("applied_count", composition.applied.len());

        Ok(ComposedQuote {
            subtotal,
            composition,
            rejected,
        })
    }

    #[tracing::instrument(
        name = "checkout.service.redeem",
        skip(self),
        fields(voucher_uuid = %voucher, user_uuid = %user, order_uuid = %order),
        err
    )]
    async fn redeem(
        &self,
        voucher: VoucherUuid,
        user: UserUuid,
        order: OrderUuid,
    ) -> Result<UsageRecord, CheckoutError> {
        match self.ledger.reserve(voucher, user, order).await? {
            ReserveOutcome::Reserved(record) => {
                info!(voucher_uuid = %voucher, order_uuid = %order, "redeemed voucher");
                Ok(record)
            }
            ReserveOutcome::AlreadyReserved(record) => Ok(record),
            ReserveOutcome::LimitExceeded => Err(CheckoutError::LimitExceeded),
            ReserveOutcome::PerUserLimitExceeded => Err(CheckoutError::PerUserLimitExceeded),
            ReserveOutcome::Unavailable { status } => Err(CheckoutError::Unavailable { status }),
            ReserveOutcome::NotFound => Err(CheckoutError::NotFound),
        }
    }

    async fn confirm(
        &self,
        voucher: VoucherUuid,
        order: OrderUuid,
    ) -> Result<UsageRecord, CheckoutError> {
        Ok(self.ledger.confirm(voucher, order).await?)
    }

    async fn release(
        &self,
        voucher: VoucherUuid,
        order: OrderUuid,
    ) -> Result<UsageRecord, CheckoutError> {
        Ok(self.ledger.release(voucher, order).await?)
    }

    #[tracing::instrument(
        name = "checkout.service.list_available",
        skip(self),
        fields(
            user_uuid = %user,
            store_uuid = ?store,
            voucher_count = tracing::field::Empty
        ),
        err
    )]
    async fn list_available(
        &self,
        user: UserUuid,
        store: Option<StoreUuid>,
        now: Timestamp,
    ) -> Result<Vec<VoucherRecord>, CheckoutError> {
        let mut tx = self.db.begin_transaction().await?;

        let records = self
            .vouchers
            .list_available(&mut tx, user, store, now)
            .await?;

        tx.commit().await?;

        Span::current().record("voucher_count", records.len());

        Ok(records)
    }
}

#[automock]
#[async_trait]
pub trait CheckoutService: Send + Sync {
    /// Preview `code` on an order. Read-only.
    async fn validate(
        &self,
        code: &str,
        user: UserUuid,
        store: StoreUuid,
        lines: Vec<OrderLine>,
        now: Timestamp,
    ) -> Result<Quote, CheckoutError>;

    /// Preview several codes combined on one order. Read-only.
    async fn compose(
        &self,
        codes: Vec<String>,
        user: UserUuid,
        store: StoreUuid,
        lines: Vec<OrderLine>,
        now: Timestamp,
    ) -> Result<ComposedQuote, CheckoutError>;

    /// Reserve a use of `voucher` for `order`.
    async fn redeem(
        &self,
        voucher: VoucherUuid,
        user: UserUuid,
        order: OrderUuid,
    ) -> Result<UsageRecord, CheckoutError>;

    /// Finalise the order's use once it completes.
    async fn confirm(
        &self,
        voucher: VoucherUuid,
        order: OrderUuid,
    ) -> Result<UsageRecord, CheckoutError>;

    /// Give the use back when the order is cancelled before completion.
    async fn release(
        &self,
        voucher: VoucherUuid,
        order: OrderUuid,
    ) -> Result<UsageRecord, CheckoutError>;

    /// Active vouchers `user` can still use, optionally limited to one store.
    async fn list_available(
        &self,
        user: UserUuid,
        store: Option<StoreUuid>,
        now: Timestamp,
    ) -> Result<Vec<VoucherRecord>, CheckoutError>;
}

#[cfg(test)]
mod tests {
    use rusty_money::{Money, iso::VND};
    use testresult::TestResult;
    use vouchers::{
        conditions::{TagQualification, UserConditions},
        eligibility::Ineligibility,
        ids::ProductUuid,
        lifecycle::VoucherStatus,
        voucher::{VoucherScope, VoucherTerms},
    };

    use crate::{
        domain::{
            customers::{CustomerProfile, MockCustomerDirectory},
            ledger::MockUsageLedger,
            vouchers::VouchersService,
        },
        test::{
            TestContext,
            helpers::{admin, create_voucher, fixed_terms, percentage_terms},
        },
    };

    use super::*;

    fn line(unit_price: u64) -> OrderLine {
        OrderLine {
            product: ProductUuid::new(),
            category: None,
            quantity: 1,
            unit_price,
        }
    }

    #[tokio::test]
    async fn validate_quotes_capped_percentage() -> TestResult {
        let ctx = TestContext::new().await;

        create_voucher(&ctx, "TENOFF", percentage_terms(10, Some(5_000))).await?;

        let quote = ctx
            .checkout
            .validate(
                "tenoff",
                UserUuid::new(),
                StoreUuid::new(),
                vec![line(100_000)],
                Timestamp::now(),
            )
            .await?;

        assert_eq!(quote.subtotal, Money::from_minor(100_000, VND));
        assert_eq!(quote.discount.amount, Money::from_minor(5_000, VND));
        assert_eq!(quote.total(), Money::from_minor(95_000, VND));

        Ok(())
    }

    #[tokio::test]
    async fn validate_does_not_record_usage() -> TestResult {
        let ctx = TestContext::new().await;

        let record = create_voucher(&ctx, "PREVIEW", fixed_terms(1_000)).await?;

        for _ in 0..3 {
            ctx.checkout
                .validate(
                    "PREVIEW",
                    UserUuid::new(),
                    StoreUuid::new(),
                    vec![line(10_000)],
                    Timestamp::now(),
                )
                .await?;
        }

        let fetched = ctx.vouchers.get_voucher(record.voucher.uuid).await?;

        assert_eq!(fetched.voucher.total_used_count, 0);

        Ok(())
    }

    #[tokio::test]
    async fn validate_gates_new_user_vouchers_on_order_history() -> TestResult {
        let ctx = TestContext::new().await;

        let mut terms = fixed_terms(20_000);
        terms.new_user_only = true;

        create_voucher(&ctx, "FIRSTORDER", terms).await?;

        let returning = UserUuid::new();
        ctx.add_customer_profile(returning, 1, &[]).await?;

        let result = ctx
            .checkout
            .validate(
                "FIRSTORDER",
                returning,
                StoreUuid::new(),
                vec![line(100_000)],
                Timestamp::now(),
            )
            .await;

        assert!(
            matches!(
                result,
                Err(CheckoutError::Ineligible(Ineligibility::NewUserOnly))
            ),
            "expected NewUserOnly, got {result:?}"
        );

        ctx.checkout
            .validate(
                "FIRSTORDER",
                UserUuid::new(),
                StoreUuid::new(),
                vec![line(100_000)],
                Timestamp::now(),
            )
            .await?;

        Ok(())
    }

    #[tokio::test]
    async fn validate_counts_the_users_previous_redemptions() -> TestResult {
        let ctx = TestContext::new().await;
        let user = UserUuid::new();

        let record = create_voucher(&ctx, "ONCEONLY", fixed_terms(1_000)).await?;

        ctx.checkout
            .redeem(record.voucher.uuid, user, OrderUuid::new())
            .await?;

        let result = ctx
            .checkout
            .validate(
                "ONCEONLY",
                user,
                StoreUuid::new(),
                vec![line(10_000)],
                Timestamp::now(),
            )
            .await;

        assert!(
            matches!(
                result,
                Err(CheckoutError::Ineligible(Ineligibility::PerUserLimitReached))
            ),
            "expected PerUserLimitReached, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn validate_uses_customer_tags() -> TestResult {
        let ctx = TestContext::new().await;

        let mut terms = fixed_terms(5_000);
        terms.user_conditions = Some(UserConditions {
            min_prior_orders: None,
            tags: Some(TagQualification::any_of(["vip"])),
        });

        create_voucher(&ctx, "VIPONLY", terms).await?;

        let mut customers = MockCustomerDirectory::new();
        customers.expect_profile().returning(|_| {
            Ok(CustomerProfile {
                prior_completed_orders: 3,
                tags: ["vip".to_string()].into_iter().collect(),
            })
        });

        let checkout = PgCheckoutService::new(
            ctx.app_db.clone(),
            Arc::new(ctx.ledger.clone()),
            Arc::new(customers),
            VND,
        );

        let quote = checkout
            .validate(
                "VIPONLY",
                UserUuid::new(),
                StoreUuid::new(),
                vec![line(50_000)],
                Timestamp::now(),
            )
            .await?;

        assert_eq!(quote.discount.amount, Money::from_minor(5_000, VND));

        let result = ctx
            .checkout
            .validate(
                "VIPONLY",
                UserUuid::new(),
                StoreUuid::new(),
                vec![line(50_000)],
                Timestamp::now(),
            )
            .await;

        assert!(
            matches!(
                result,
                Err(CheckoutError::Ineligible(Ineligibility::UserConditionsNotMet))
            ),
            "expected UserConditionsNotMet, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() -> TestResult {
        let ctx = TestContext::new().await;

        let result = ctx
            .checkout
            .validate(
                "MISSING",
                UserUuid::new(),
                StoreUuid::new(),
                vec![line(10_000)],
                Timestamp::now(),
            )
            .await;

        assert!(
            matches!(result, Err(CheckoutError::NotFound)),
            "expected NotFound, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn redeem_reports_exhausted_voucher() -> TestResult {
        let ctx = TestContext::new().await;

        let mut terms = fixed_terms(1_000);
        terms.total_usage_limit = Some(1);

        let voucher = create_voucher(&ctx, "SINGLEUSE", terms).await?.voucher.uuid;

        ctx.checkout
            .redeem(voucher, UserUuid::new(), OrderUuid::new())
            .await?;

        let result = ctx
            .checkout
            .redeem(voucher, UserUuid::new(), OrderUuid::new())
            .await;

        assert!(
            matches!(result, Err(CheckoutError::LimitExceeded)),
            "expected LimitExceeded, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn redeem_maps_ledger_outcomes() -> TestResult {
        let ctx = TestContext::new().await;

        let mut ledger = MockUsageLedger::new();
        ledger
            .expect_reserve()
            .returning(|_, _, _| Ok(ReserveOutcome::PerUserLimitExceeded));

        let checkout = PgCheckoutService::new(
            ctx.app_db.clone(),
            Arc::new(ledger),
            Arc::new(MockCustomerDirectory::new()),
            VND,
        );

        let result = checkout
            .redeem(VoucherUuid::new(), UserUuid::new(), OrderUuid::new())
            .await;

        assert!(
            matches!(result, Err(CheckoutError::PerUserLimitExceeded)),
            "expected PerUserLimitExceeded, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn compose_applies_stackable_vouchers_and_reports_rejections() -> TestResult {
        let ctx = TestContext::new().await;

        let mut shipping = fixed_terms(15_000);
        shipping.stackable = true;
        shipping.priority = 1;

        let mut percent = percentage_terms(20, Some(30_000));
        percent.stackable = true;
        percent.priority = 9;

        let mut big_spender = fixed_terms(50_000);
        big_spender.min_order_amount = Some(1_000_000);

        create_voucher(&ctx, "SHIPFREE", shipping).await?;
        let pct = create_voucher(&ctx, "PCT20", percent).await?;
        let big = create_voucher(&ctx, "BIGSPEND", big_spender).await?;

        let quote = ctx
            .checkout
            .compose(
                vec!["SHIPFREE".into(), "PCT20".into(), "BIGSPEND".into()],
                UserUuid::new(),
                StoreUuid::new(),
                vec![line(200_000)],
                Timestamp::now(),
            )
            .await?;

        assert_eq!(quote.composition.total, Money::from_minor(45_000, VND));
        assert_eq!(
            quote.composition.applied.first().map(|s| s.voucher),
            Some(pct.voucher.uuid)
        );
        assert_eq!(quote.rejected.len(), 1);
        assert_eq!(
            quote.rejected.first().map(|r| (r.voucher.uuid, r.reason)),
            Some((big.voucher.uuid, Ineligibility::MinOrderNotMet))
        );

        Ok(())
    }

    #[tokio::test]
    async fn list_available_filters_unusable_vouchers() -> TestResult {
        let ctx = TestContext::new().await;
        let user = UserUuid::new();
        let store = StoreUuid::new();
        let other_store = StoreUuid::new();

        let open = create_voucher(&ctx, "OPEN", fixed_terms(1_000)).await?;

        let paused = create_voucher(&ctx, "PAUSED", fixed_terms(1_000)).await?;
        ctx.vouchers
            .set_status(admin(), paused.voucher.uuid, VoucherStatus::Paused)
            .await?;

        let used = create_voucher(&ctx, "USEDUP", fixed_terms(1_000)).await?;
        ctx.checkout
            .redeem(used.voucher.uuid, user, OrderUuid::new())
            .await?;

        let mut elsewhere: VoucherTerms = fixed_terms(1_000);
        elsewhere.scope = VoucherScope::Store(other_store);
        let elsewhere = create_voucher(&ctx, "ELSEWHERE", elsewhere).await?;

        let available = ctx
            .checkout
            .list_available(user, Some(store), Timestamp::now())
            .await?;

        let uuids: Vec<_> = available.iter().map(|r| r.voucher.uuid).collect();

        assert_eq!(uuids, vec![open.voucher.uuid]);

        let everywhere = ctx
            .checkout
            .list_available(user, None, Timestamp::now())
            .await?;

        assert!(everywhere.iter().any(|r| r.voucher.uuid == elsewhere.voucher.uuid));
        assert!(!everywhere.iter().any(|r| r.voucher.uuid == used.voucher.uuid));

        Ok(())
    }
}
