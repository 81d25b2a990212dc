//! CLI binary for quarry.

use std::process::ExitCode;

use clap::Parser;
use quarry::cli::{execute, Cli};
use quarry::{logging, QuarryConfig, QuarryError};
use quarry_engine::RetrievalEngine;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let outcome = run(&cli).await;
    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            tracing::debug!(error = %err, "command failed");
            println!("{}", serde_json::to_string_pretty(&err.to_report())?);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(cli: &Cli) -> Result<serde_json::Value, QuarryError> {
    let config = QuarryConfig::load(cli.config.as_deref())?;
    logging::init_tracing(&config.logging.filter);

    let engine = RetrievalEngine::new(config.into_engine_config()?)?;
    execute(&engine, &cli.command).await
}
