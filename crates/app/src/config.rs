//! Application configuration module

use std::time::Duration;

use clap::Args;
use rusty_money::iso::{self, Currency};
use thiserror::Error;

pub mod logging;

use logging::LoggingConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown ISO currency code {0:?}")]
    UnknownCurrency(String),
}

/// Voucher engine configuration
#[derive(Debug, Args)]
pub struct AppConfig {
    /// `PostgreSQL` connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true, global = true)]
    pub database_url: Option<String>,

    /// Milliseconds a ledger write waits for a voucher row lock
    #[arg(
        long,
        env = "LEDGER_LOCK_TIMEOUT_MS",
        default_value_t = 2_000_u64,
        global = true
    )]
    pub ledger_lock_timeout_ms: u64,

    /// ISO 4217 code of the currency order amounts are expressed in
    #[arg(long, env = "VOUCHER_CURRENCY", default_value = "VND", global = true)]
    pub currency: String,

    #[command(flatten)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    #[must_use]
    pub fn ledger_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_lock_timeout_ms)
    }

    /// Resolve the configured currency code.
    ///
    /// # Errors
    ///
    /// Returns an error when the code is not an ISO 4217 currency.
    pub fn currency(&self) -> Result<&'static Currency, ConfigError> {
        iso::find(&self.currency.to_ascii_uppercase())
            .ok_or_else(|| ConfigError::UnknownCurrency(self.currency.clone()))
    }
}
