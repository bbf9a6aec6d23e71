//! Subscriber setup: console output plus an optional daily log file.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use time::{Date, OffsetDateTime, UtcOffset};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::CliError;

/// Install the global subscriber.
///
/// Filter precedence: `--log-level`, then `RUST_LOG`, then the configured
/// level. Returns the path of the log file when one is written.
pub fn init(
    cli_level: Option<&str>,
    config: &LoggingConfig,
    offset: UtcOffset,
) -> Result<Option<PathBuf>, CliError> {
    let filter = build_filter(cli_level, &config.level)?;

    let file = match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let today = OffsetDateTime::now_utc().to_offset(offset).date();
            let path = directory.join(log_file_name(today));
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            Some((path, file))
        }
        None => None,
    };

    let (path, file_layer) = match file {
        Some((path, file)) => (
            Some(path),
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            ),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|error| CliError::Config(format!("logging already initialized: {error}")))?;

    Ok(path)
}

fn build_filter(cli_level: Option<&str>, configured: &str) -> Result<EnvFilter, CliError> {
    let directive = match cli_level {
        Some(level) => level.to_owned(),
        None => match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(value) if !value.trim().is_empty() => value,
            _ => configured.to_owned(),
        },
    };

    EnvFilter::try_new(&directive)
        .map_err(|error| CliError::Config(format!("invalid log filter '{directive}': {error}")))
}

/// `trading_YYYYMMDD.log` for the given local date.
pub fn log_file_name(date: Date) -> String {
    format!(
        "trading_{:04}{:02}{:02}.log",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn file_name_is_zero_padded() {
        assert_eq!(log_file_name(date!(2024 - 03 - 05)), "trading_20240305.log");
    }

    #[test]
    fn cli_level_wins() {
        assert!(build_filter(Some("debug"), "info").is_ok());
        assert!(build_filter(Some("sniper=loud"), "info").is_err());
    }
}
