mod cli;
mod scenario;

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use reindex_core::config::{load_dotenv, Config};

use crate::cli::CliArgs;
use crate::scenario::{timestamp, Scenario};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let args = CliArgs::parse();

    load_dotenv();
    let mut config = Config::from_env();
    args.apply(&mut config);

    if args.show_config {
        println!("{}", serde_json::to_string_pretty(&config.redacted_summary())?);
        return Ok(ExitCode::SUCCESS);
    }
    config.log_summary();

    let store = reindex_store::from_config(&config.store);
    info!(backend = store.backend_name(), "store ready");

    let mut scenario = Scenario::new(store, config.scenario.clone(), io::stdout());
    match scenario.run().await {
        Ok(report) if report.all_passed() => {
            info!("all expectations passed");
            Ok(ExitCode::SUCCESS)
        }
        Ok(report) => {
            let failed = report.expectations.iter().filter(|e| !e.passed).count();
            error!(failed, "scenario finished with failed expectations");
            Ok(ExitCode::from(2))
        }
        Err(e) => {
            error!(error = ?e, "scenario aborted");
            println!("\n --- ERROR: {e:#}");
            println!("{}", timestamp());
            Ok(ExitCode::FAILURE)
        }
    }
}
