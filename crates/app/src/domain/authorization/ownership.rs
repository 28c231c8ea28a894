//! Store Ownership

use async_trait::async_trait;
use mockall::automock;
use sqlx::query_scalar;
use vouchers::ids::{StoreUuid, UserUuid};

use crate::database::Db;

const OWNS_STORE_SQL: &str = include_str!("sql/owns_store.sql");

/// Answers whether a user owns a store.
#[automock]
#[async_trait]
pub trait StoreOwnership: Send + Sync {
    async fn owns_store(&self, user: UserUuid, store: StoreUuid) -> Result<bool, sqlx::Error>;
}

/// Store ownership read from the `store_owners` table.
#[derive(Debug, Clone)]
pub struct PgStoreOwnership {
    db: Db,
}

impl PgStoreOwnership {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StoreOwnership for PgStoreOwnership {
    async fn owns_store(&self, user: UserUuid, store: StoreUuid) -> Result<bool, sqlx::Error> {
        query_scalar(OWNS_STORE_SQL)
            .bind(store.into_uuid())
            .bind(user.into_uuid())
            .fetch_one(self.db.pool())
            .await
    }
}
