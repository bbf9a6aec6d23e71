//! CLI argument definitions for the sniper bot.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Scheduler loop: one session per market window |
//! | `session` | Run one session for a market right now |
//! | `check` | Authenticate and print the current price of every ticker |
//! | `balance` | Print the account balance as JSON |
//! | `stream` | Log real-time prices from the websocket feed |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | `sniper.toml` | Configuration file (optional) |
//! | `--log-level` | from config | `EnvFilter` directive, overrides `RUST_LOG` |
//!
//! # Examples
//!
//! ```bash
//! # Trade every configured market on schedule
//! sniper run
//!
//! # Force a session for the US market now
//! sniper session --market overseas
//!
//! # Inspect the paper account
//! KIS_MOCK=true sniper balance --market overseas
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use sniper_core::Market;

use crate::config::DEFAULT_CONFIG_PATH;

/// Volatility-breakout trading bot for US and KRX ETFs.
#[derive(Debug, Parser)]
#[command(
    name = "sniper",
    author,
    version,
    about = "Volatility-breakout trading bot",
    long_about = "Watches a universe of tickers during each market's regular session, \
buys on a breakout above open + k * previous range when the trend and the news \
sentiment agree, and flattens every position at the close.\n\
\n\
Brokerage credentials are read from KIS_APP_KEY, KIS_APP_SECRET, KIS_CANO and \
KIS_ACNT_PRDT_CD; set KIS_MOCK=false to trade the live account."
)]
pub struct Cli {
    /// Path to the TOML configuration file. Defaults apply when it is missing.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log filter directive (e.g. `debug` or `sniper_core=debug,info`).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduler: a session starts whenever a configured market opens.
    Run,

    /// Run one trading session for a market immediately.
    ///
    /// The session still ends when the market clock leaves the market's
    /// window, so outside trading hours it builds the watchlist and stops.
    Session(MarketArgs),

    /// Authenticate and log the current price of every ticker in the universe.
    Check(MarketArgs),

    /// Print the account balance (and USD deposit for overseas) as JSON.
    Balance(MarketArgs),

    /// Stream real-time prices for the universe until interrupted.
    Stream(MarketArgs),
}

#[derive(Debug, Clone, Args)]
pub struct MarketArgs {
    /// Market to act on (`overseas` or `domestic`).
    #[arg(long, default_value = "overseas", value_parser = parse_market)]
    pub market: Market,
}

fn parse_market(raw: &str) -> Result<Market, String> {
    raw.parse()
}
