use clap::{Args, Subcommand};
use vouchers_app::context::AppContext;

mod release;

#[derive(Debug, Args)]
pub(crate) struct LedgerCommand {
    #[command(subcommand)]
    command: LedgerSubcommand,
}

#[derive(Debug, Subcommand)]
enum LedgerSubcommand {
    /// Undo an unconfirmed redemption
    Release(release::ReleaseArgs),
}

pub(crate) async fn run(ctx: &AppContext, command: LedgerCommand) -> Result<(), String> {
    match command.command {
        LedgerSubcommand::Release(args) => release::run(ctx, args).await,
    }
}
