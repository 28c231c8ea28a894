use clap::Args;
use vouchers::ids::{OrderUuid, VoucherUuid};
use vouchers_app::context::AppContext;

#[derive(Debug, Args)]
pub(crate) struct ReleaseArgs {
    #[arg(long)]
    voucher: VoucherUuid,

    #[arg(long)]
    order: OrderUuid,
}

pub(crate) async fn run(ctx: &AppContext, args: ReleaseArgs) -> Result<(), String> {
    let released = ctx
        .ledger
        .release(args.voucher, args.order)
        .await
        .map_err(|error| format!("failed to release order {}: {error}", args.order))?;

    println!(
        "released voucher {} from order {} (user {})",
        released.voucher, released.order, released.user
    );

    Ok(())
}
