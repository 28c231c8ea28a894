use std::{fs, path::PathBuf};

use clap::Args;
use tracing::info;
use vouchers_app::{
    context::AppContext,
    domain::{authorization::Principal, vouchers::documents::VouchersDocument},
};

#[derive(Debug, Args)]
pub(crate) struct ImportVouchersArgs {
    /// YAML file with a top-level `vouchers` list
    #[arg(long)]
    file: PathBuf,
}

pub(crate) async fn run(
    ctx: &AppContext,
    principal: Principal,
    args: &ImportVouchersArgs,
) -> Result<(), String> {
    let contents = fs::read_to_string(&args.file)
        .map_err(|error| format!("failed to read {}: {error}", args.file.display()))?;

    let document: VouchersDocument = serde_norway::from_str(&contents)
        .map_err(|error| format!("failed to parse {}: {error}", args.file.display()))?;

    let total = document.vouchers.len();

    for definition in document.vouchers {
        let code = definition.code.clone();

        let voucher = definition
            .into_new_voucher()
            .map_err(|error| format!("invalid voucher {code}: {error}"))?;

        let record = ctx
            .vouchers
            .create_voucher(principal, voucher)
            .await
            .map_err(|error| format!("failed to create voucher {code}: {error}"))?;

        println!(
            "{}\t{}\t{}",
            record.voucher.code, record.voucher.uuid, record.voucher.status
        );
    }

    info!(total, file = %args.file.display(), "imported vouchers");

    Ok(())
}
