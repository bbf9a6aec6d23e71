mod cli;
mod commands;
mod config;
mod error;
mod logging;

use clap::Parser;
use std::process::ExitCode;

use crate::cli::Cli;
use crate::config::Config;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();
    let env_file = config::load_env_file(None)?;

    let config = Config::load_or_default(&cli.config)?;
    config.validate()?;

    let log_file = logging::init(
        cli.log_level.as_deref(),
        &config.logging,
        config.markets.utc_offset()?,
    )?;
    if let Some(path) = &log_file {
        tracing::info!(path = %path.display(), "writing log file");
    }
    if let Some(path) = &env_file {
        tracing::info!(path = %path.display(), "loaded environment file");
    }

    commands::run(&cli, &config).await?;
    Ok(ExitCode::SUCCESS)
}
