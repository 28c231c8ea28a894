use clap::Args;
use vouchers_app::context::AppContext;

#[derive(Debug, Args)]
pub(crate) struct ShowVoucherArgs {
    /// Voucher code, any case
    #[arg(long)]
    code: String,
}

pub(crate) async fn run(ctx: &AppContext, args: &ShowVoucherArgs) -> Result<(), String> {
    let record = ctx
        .vouchers
        .find_by_code(&args.code)
        .await
        .map_err(|error| format!("failed to load voucher {}: {error}", args.code))?;

    let voucher = &record.voucher;
    let terms = &voucher.terms;

    println!("uuid: {}", voucher.uuid);
    println!("code: {}", voucher.code);
    println!("status: {}", voucher.status);
    println!("discount: {} {}", terms.discount.kind, terms.discount.value);

    if let Some(cap) = terms.discount.max_discount_amount {
        println!("max_discount_amount: {cap}");
    }

    println!("valid: {} .. {}", terms.starts_at, terms.ends_at);
    println!(
        "used: {} / {}",
        voucher.total_used_count,
        terms
            .total_usage_limit
            .map_or_else(|| "unlimited".to_string(), |limit| limit.to_string())
    );
    println!("per_user_limit: {}", terms.per_user_limit);
    println!(
        "collected: {} ({})",
        voucher.collected_count, terms.collection_type
    );
    println!("updated_at: {}", record.updated_at);

    Ok(())
}
