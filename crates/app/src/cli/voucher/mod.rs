use clap::{Args, Subcommand};
use uuid::Uuid;
use vouchers::ids::UserUuid;
use vouchers_app::{context::AppContext, domain::authorization::Principal};

mod import;
mod show;
mod status;

#[derive(Debug, Args)]
pub(crate) struct VoucherCommand {
    /// Platform administrator the changes are recorded against
    #[arg(long, env = "VOUCHER_OPERATOR_UUID", global = true)]
    operator: Option<Uuid>,

    #[command(subcommand)]
    command: VoucherSubcommand,
}

#[derive(Debug, Subcommand)]
enum VoucherSubcommand {
    /// Create platform vouchers from a YAML file
    Import(import::ImportVouchersArgs),

    /// Print a voucher's terms and counters
    Show(show::ShowVoucherArgs),

    /// Activate or pause a voucher
    Status(status::SetStatusArgs),
}

impl VoucherCommand {
    fn principal(&self) -> Result<Principal, String> {
        self.operator
            .map(|uuid| Principal::platform_admin(UserUuid::from_uuid(uuid)))
            .ok_or_else(|| "--operator or VOUCHER_OPERATOR_UUID is required".to_string())
    }
}

pub(crate) async fn run(ctx: &AppContext, command: VoucherCommand) -> Result<(), String> {
    match command.command {
        VoucherSubcommand::Import(ref args) => {
            import::run(ctx, command.principal()?, args).await
        }
        VoucherSubcommand::Show(ref args) => show::run(ctx, args).await,
        VoucherSubcommand::Status(ref args) => {
            status::run(ctx, command.principal()?, args).await
        }
    }
}
