//! App Context

use std::sync::Arc;

use thiserror::Error;

use crate::{
    config::{AppConfig, ConfigError},
    database::{self, Db},
    domain::{
        authorization::PgStoreOwnership,
        checkout::{CheckoutService, PgCheckoutService},
        collections::{CollectionsService, PgCollectionsService},
        customers::PgCustomerDirectory,
        ledger::{PgUsageLedger, UsageLedger},
        vouchers::{PgVouchersService, VouchersService},
    },
};

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,

    #[error("failed to connect to database")]
    Database(#[source] sqlx::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Clone)]
pub struct AppContext {
    pub vouchers: Arc<dyn VouchersService>,
    pub ledger: Arc<dyn UsageLedger>,
    pub collections: Arc<dyn CollectionsService>,
    pub checkout: Arc<dyn CheckoutService>,
}

impl AppContext {
    /// Build application context from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is incomplete or establishing a
    /// database connection fails.
    pub async fn from_config(config: &AppConfig) -> Result<Self, AppInitError> {
        let url = config
            .database_url
            .as_deref()
            .ok_or(AppInitError::MissingDatabaseUrl)?;

        let currency = config.currency()?;

        let pool = database::connect(url)
            .await
            .map_err(AppInitError::Database)?;

        let db = Db::new(pool).with_lock_timeout(config.ledger_lock_timeout());

        let ledger = Arc::new(PgUsageLedger::new(db.clone()));

        Ok(Self {
            vouchers: Arc::new(PgVouchersService::new(
                db.clone(),
                Arc::new(PgStoreOwnership::new(db.clone())),
            )),
            collections: Arc::new(PgCollectionsService::new(db.clone())),
            checkout: Arc::new(PgCheckoutService::new(
                db.clone(),
                ledger.clone(),
                Arc::new(PgCustomerDirectory::new(db)),
                currency,
            )),
            ledger,
        })
    }
}
