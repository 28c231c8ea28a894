use clap::{Args, ValueEnum};
use vouchers::lifecycle::VoucherStatus;
use vouchers_app::{context::AppContext, domain::authorization::Principal};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TargetStatus {
    Active,
    Paused,
}

impl From<TargetStatus> for VoucherStatus {
    fn from(status: TargetStatus) -> Self {
        match status {
            TargetStatus::Active => VoucherStatus::Active,
            TargetStatus::Paused => VoucherStatus::Paused,
        }
    }
}

#[derive(Debug, Args)]
pub(crate) struct SetStatusArgs {
    /// Voucher code, any case
    #[arg(long)]
    code: String,

    #[arg(long, value_enum)]
    status: TargetStatus,
}

pub(crate) async fn run(
    ctx: &AppContext,
    principal: Principal,
    args: &SetStatusArgs,
) -> Result<(), String> {
    let record = ctx
        .vouchers
        .find_by_code(&args.code)
        .await
        .map_err(|error| format!("failed to load voucher {}: {error}", args.code))?;

    let updated = ctx
        .vouchers
        .set_status(principal, record.voucher.uuid, args.status.into())
        .await
        .map_err(|error| format!("failed to update voucher {}: {error}", args.code))?;

    println!("{}: {} -> {}", updated.voucher.code, record.voucher.status, updated.voucher.status);

    Ok(())
}
