//! Customers
//!
//! Facts about a customer that eligibility depends on. The order and profile
//! collaborators own this data; the voucher engine only reads it.

use async_trait::async_trait;
use mockall::automock;
use rustc_hash::FxHashSet;
use sqlx::query_as;
use vouchers::ids::UserUuid;

use crate::database::{Db, try_u64_from_i64};

const GET_CUSTOMER_PROFILE_SQL: &str = include_str!("sql/get_customer_profile.sql");

/// Customer history and segmentation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerProfile {
    pub prior_completed_orders: u64,
    pub tags: FxHashSet<String>,
}

#[automock]
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// Completed orders and tags for `user`. Unknown users have no history.
    async fn profile(&self, user: UserUuid) -> Result<CustomerProfile, sqlx::Error>;
}

/// Customer facts read from `customer_profiles`.
#[derive(Debug, Clone)]
pub struct PgCustomerDirectory {
    db: Db,
}

impl PgCustomerDirectory {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CustomerDirectory for PgCustomerDirectory {
    #[tracing::instrument(
        name = "customers.directory.profile",
        skip(self),
        fields(user_uuid = %user),
        err
    )]
    async fn profile(&self, user: UserUuid) -> Result<CustomerProfile, sqlx::Error> {
        let row: Option<(i64, Vec<String>)> = query_as(GET_CUSTOMER_PROFILE_SQL)
            .bind(user.into_uuid())
            .fetch_optional(self.db.pool())
            .await?;

        let Some((completed_orders, tags)) = row else {
            return Ok(CustomerProfile::default());
        };

        Ok(CustomerProfile {
            prior_completed_orders: try_u64_from_i64(completed_orders, "completed_orders")?,
            tags: tags.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::test::TestContext;

    use super::*;

    #[tokio::test]
    async fn unknown_customer_has_no_history() -> TestResult {
        let ctx = TestContext::new().await;
        let directory = PgCustomerDirectory::new(ctx.app_db.clone());

        assert_eq!(
            directory.profile(UserUuid::new()).await?,
            CustomerProfile::default()
        );

        Ok(())
    }

    #[tokio::test]
    async fn profile_reads_orders_and_tags() -> TestResult {
        let ctx = TestContext::new().await;
        let user = UserUuid::new();

        ctx.add_customer_profile(user, 4, &["vip", "student"]).await?;

        let profile = PgCustomerDirectory::new(ctx.app_db.clone())
            .profile(user)
            .await?;

        assert_eq!(profile.prior_completed_orders, 4);
        assert!(profile.tags.contains("vip"));
        assert!(profile.tags.contains("student"));

        Ok(())
    }
}
