use clap::{Parser, Subcommand};
use vouchers_app::{config::AppConfig, context::AppContext};

mod ledger;
mod voucher;

#[derive(Debug, Parser)]
#[command(name = "vouchers-app", about = "Voucher administration CLI", long_about = None)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) config: AppConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Voucher(voucher::VoucherCommand),
    Ledger(ledger::LedgerCommand),
}

impl Cli {
    /// Parse arguments, reading `.env` first when present.
    pub(crate) fn load() -> Self {
        _ = dotenvy::dotenv();

        Self::parse()
    }

    pub(crate) async fn run(self) -> Result<(), String> {
        let ctx = AppContext::from_config(&self.config)
            .await
            .map_err(|error| format!("failed to initialise: {error}"))?;

        match self.command {
            Commands::Voucher(command) => voucher::run(&ctx, command).await,
            Commands::Ledger(command) => ledger::run(&ctx, command).await,
        }
    }
}
