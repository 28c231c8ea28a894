//! Voucher Administration CLI

use std::process;

use vouchers_app::observability;

use crate::cli::Cli;

mod cli;

#[tokio::main]
pub async fn main() {
    let cli = Cli::load();

    if let Err(error) = observability::init_subscriber(&cli.config.logging) {
        eprintln!("{error}");
        process::exit(1);
    }

    if let Err(error) = cli.run().await {
        eprintln!("{error}");
        process::exit(1);
    }
}
