//! Database connection management

use std::time::Duration;

use sqlx::{PgPool, Postgres, Transaction, query};

/// SQL used to bound how long a transaction waits on row locks.
pub const SET_LOCK_TIMEOUT_SQL: &str = "SELECT set_config('lock_timeout', $1, true)";

/// Default bound on lock waits for ledger transactions.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(2_000);

#[derive(Debug, Clone)]
pub struct Db {
    pool: PgPool,
    lock_timeout: Duration,
}

impl Db {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a plain transaction.
    ///
    /// # Errors
    ///
    /// Returns an error when starting the transaction fails.
    pub async fn begin_transaction(&self) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Begin a transaction whose row-lock waits give up after the configured timeout.
    ///
    /// Lock waits past the bound fail with SQLSTATE `55P03`.
    ///
    /// # Errors
    ///
    /// Returns an error when starting the transaction or setting the timeout fails.
    pub async fn begin_bounded_transaction(
        &self,
    ) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        query(SET_LOCK_TIMEOUT_SQL)
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        Ok(tx)
    }
}

/// Connect to `PostgreSQL`.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPool::connect(database_url).await
}

/// SQLSTATE raised when a lock wait exceeds `lock_timeout`.
pub(crate) const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Whether `error` is a lock wait that exceeded `lock_timeout`.
pub(crate) fn is_lock_timeout(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == LOCK_NOT_AVAILABLE)
}

/// Convert a stored non-negative count into `u64`.
pub(crate) fn try_u64_from_i64(value: i64, column: &'static str) -> Result<u64, sqlx::Error> {
    u64::try_from(value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

/// Convert a count into a `BIGINT` bind value.
pub(crate) fn try_i64_from_u64(value: u64, column: &'static str) -> Result<i64, sqlx::Error> {
    i64::try_from(value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub(crate) fn try_optional_i64_from_u64(
    value: Option<u64>,
    column: &'static str,
) -> Result<Option<i64>, sqlx::Error> {
    value.map(|v| try_i64_from_u64(v, column)).transpose()
}

pub(crate) fn try_optional_u64_from_i64(
    value: Option<i64>,
    column: &'static str,
) -> Result<Option<u64>, sqlx::Error> {
    value.map(|v| try_u64_from_i64(v, column)).transpose()
}
