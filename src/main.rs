use std::process::ExitCode;

use app_store_entitlement::{config::IapConfig, util::IapUtil};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Verify an App Store purchase and decide whether to grant access.
///
/// Configuration is read from `APPLE_*` environment variables.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// The transaction identifier to validate.
    transaction_id: String,
    /// Fetch the single transaction instead of walking the purchase history.
    #[arg(long)]
    lookup: bool,
    /// Skip OCSP revocation checks, validating certificates as of each
    /// payload's signing time.
    #[arg(long)]
    no_online_checks: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut config = match IapConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(2);
        }
    };
    if cli.no_online_checks {
        config.enable_online_checks = false;
    }
    let util = match IapUtil::new(&config) {
        Ok(util) => util,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(2);
        }
    };

    let result = if cli.lookup {
        util.lookup_transaction(&cli.transaction_id).await
    } else {
        util.validate_purchase(&cli.transaction_id).await
    };
    match result {
        Ok(status) if status.is_entitled() => {
            println!("{status}");
            println!("Transaction is valid. Proceed with granting access to content/features.");
            ExitCode::SUCCESS
        }
        Ok(status) => {
            println!("{status}");
            println!("Transaction is invalid. Deny access to content/features.");
            ExitCode::from(1)
        }
        Err(e) => {
            error!("{e}");
            println!("Transaction is invalid. Deny access to content/features.");
            ExitCode::from(1)
        }
    }
}
