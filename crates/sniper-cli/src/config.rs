//! Configuration for the `sniper` binary.
//!
//! Settings live in a TOML file (`sniper.toml` by default) where every
//! section is optional; a missing file means the built-in defaults.
//! Credentials are never read from the file. They come from the process
//! environment, which is first topped up from a `.env` file in the working
//! directory when one exists (variables already set are left alone):
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `KIS_APP_KEY` / `KIS_APP_SECRET` | Brokerage application credentials |
//! | `KIS_CANO` / `KIS_ACNT_PRDT_CD` | Account number and product code |
//! | `KIS_MOCK` | `true` for the paper environment, `false` for live |
//! | `GEMINI_API_KEY` | Sentiment model key; the gate is disabled without it |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::UtcOffset;

use sniper_core::market_clock::parse_time_of_day;
use sniper_core::sentiment::gemini::DEFAULT_MODEL;
use sniper_core::sentiment::CNBC_FINANCE_FEED;
use sniper_core::{
    Credentials, Environment, FeedLayout, Market, MarketClock, OrderPricing, SessionSettings,
    SessionWindow, Symbol, UsExchange,
};

use crate::error::CliError;

pub const DEFAULT_CONFIG_PATH: &str = "sniper.toml";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub broker: BrokerConfig,
    pub strategy: StrategyConfig,
    pub markets: MarketsConfig,
    pub sentiment: SentimentConfig,
    pub stream: StreamConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
    pub environment: Environment,
    pub us_exchange: UsExchange,
    /// Requests admitted per `rate_limit_period_ms`, shared by both markets.
    pub rate_limit_calls: usize,
    pub rate_limit_period_ms: u64,
    /// Fraction added to (buys) or taken off (sells) the last price when
    /// pricing a marketable limit order.
    pub slippage: f64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Paper,
            us_exchange: UsExchange::Nasdaq,
            rate_limit_calls: 15,
            rate_limit_period_ms: 1_000,
            slippage: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrategyConfig {
    pub quantity: u32,
    pub k: f64,
    pub ma_window: usize,
    pub poll_interval_ms: u64,
    pub rejection_cooldown_secs: u64,
    pub stop_loss_pct: Option<f64>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        let settings = SessionSettings::default();
        Self {
            quantity: settings.quantity,
            k: settings.k,
            ma_window: settings.ma_window,
            poll_interval_ms: 100,
            rejection_cooldown_secs: 10,
            stop_loss_pct: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarketsConfig {
    /// Offset the session windows are written in.
    pub utc_offset_hours: i8,
    pub overseas: MarketConfig,
    pub domestic: MarketConfig,
}

impl Default for MarketsConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 9,
            overseas: MarketConfig {
                enabled: true,
                opens: None,
                closes: None,
                universe: ["NVDL", "SOXL", "TQQQ", "TECL", "FNGU", "BITX", "CONL", "TSLA"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            },
            domestic: MarketConfig {
                enabled: false,
                opens: None,
                closes: None,
                universe: Vec::new(),
            },
        }
    }
}

impl MarketsConfig {
    pub fn utc_offset(&self) -> Result<UtcOffset, CliError> {
        UtcOffset::from_hms(self.utc_offset_hours, 0, 0).map_err(|_| {
            CliError::Config(format!(
                "utc_offset_hours {} is out of range",
                self.utc_offset_hours
            ))
        })
    }

    pub fn get(&self, market: Market) -> &MarketConfig {
        match market {
            Market::Overseas => &self.overseas,
            Market::Domestic => &self.domestic,
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = Market> + '_ {
        Market::ALL
            .into_iter()
            .filter(|market| self.get(*market).enabled)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarketConfig {
    pub enabled: bool,
    /// Local `HH:MM` the regular session opens. Defaults to the market's
    /// regular hours in KST.
    pub opens: Option<String>,
    /// Local `HH:MM` the regular session closes; may be earlier than
    /// `opens` for a window that runs past midnight.
    pub closes: Option<String>,
    pub universe: Vec<String>,
}

impl MarketConfig {
    pub fn window(&self, market: Market) -> Result<SessionWindow, CliError> {
        let regular = MarketClock::default()
            .windows()
            .iter()
            .find(|window| window.market == market)
            .copied()
            .ok_or_else(|| CliError::Config(format!("no regular hours known for {market}")))?;

        let opens = match &self.opens {
            Some(raw) => parse_time_of_day(raw)?,
            None => regular.opens,
        };
        let closes = match &self.closes {
            Some(raw) => parse_time_of_day(raw)?,
            None => regular.closes,
        };
        if opens == closes {
            return Err(CliError::Config(format!(
                "{market} window opens and closes at the same time"
            )));
        }
        Ok(SessionWindow::new(market, opens, closes))
    }

    pub fn symbols(&self, market: Market) -> Result<Vec<Symbol>, CliError> {
        self.universe
            .iter()
            .map(|raw| Symbol::parse(market, raw).map_err(CliError::from))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SentimentConfig {
    pub enabled: bool,
    pub model: String,
    pub feed_url: String,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: DEFAULT_MODEL.to_owned(),
            feed_url: CNBC_FINANCE_FEED.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    pub overseas: FeedLayout,
    pub domestic: FeedLayout,
    pub buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            overseas: FeedLayout::overseas(),
            domestic: FeedLayout::domestic(),
            buffer: 256,
        }
    }
}

impl StreamConfig {
    pub fn layout(&self, market: Market) -> &FeedLayout {
        match market {
            Market::Overseas => &self.overseas,
            Market::Domestic => &self.domestic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `--log-level` and `RUST_LOG` are unset.
    pub level: String,
    /// Directory for the daily `trading_YYYYMMDD.log` file; no file when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            directory: Some(PathBuf::from("logs")),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|error| CliError::Config(format!("{}: {error}", path.display())))
    }

    /// Load `path`, or fall back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, CliError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), CliError> {
        self.session_settings().validate()?;
        if self.strategy.ma_window == 0 {
            return Err(CliError::Config(String::from("ma_window must be positive")));
        }
        if self.broker.rate_limit_calls == 0 || self.broker.rate_limit_period_ms == 0 {
            return Err(sniper_core::ValidationError::InvalidRateLimit.into());
        }
        self.pricing()?;
        self.market_clock()?;

        for market in self.markets.enabled() {
            let symbols = self.markets.get(market).symbols(market)?;
            if symbols.is_empty() {
                return Err(CliError::Config(format!(
                    "{market} market is enabled with an empty universe"
                )));
            }
        }
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            quantity: self.strategy.quantity,
            k: self.strategy.k,
            ma_window: self.strategy.ma_window,
            poll_interval: Duration::from_millis(self.strategy.poll_interval_ms),
            rejection_cooldown: Duration::from_secs(self.strategy.rejection_cooldown_secs),
            stop_loss_pct: self.strategy.stop_loss_pct,
        }
    }

    pub fn pricing(&self) -> Result<OrderPricing, CliError> {
        Ok(OrderPricing::new(self.broker.slippage)?)
    }

    /// Session windows of every market, enabled or not, so a one-off session
    /// for a disabled market still follows its hours.
    pub fn market_clock(&self) -> Result<MarketClock, CliError> {
        let windows = Market::ALL
            .into_iter()
            .map(|market| self.markets.get(market).window(market))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MarketClock::new(self.markets.utc_offset()?, windows))
    }

    pub fn rate_limit_period(&self) -> Duration {
        Duration::from_millis(self.broker.rate_limit_period_ms)
    }
}

/// Load `KEY=value` lines from a `.env` file into the process environment.
///
/// With no `path`, `.env` is searched for from the working directory
/// upwards. A missing file is not an error; a malformed one is.
pub fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>, CliError> {
    let loaded = match path {
        Some(path) => dotenv::from_path(path).map(|()| path.to_path_buf()),
        None => dotenv::dotenv(),
    };

    match loaded {
        Ok(path) => Ok(Some(path)),
        Err(error) if error.not_found() => Ok(None),
        Err(error) => Err(CliError::Config(format!("cannot load .env file: {error}"))),
    }
}

/// Secrets resolved from the environment.
pub struct Secrets {
    pub credentials: Credentials,
    pub environment: Environment,
    pub gemini_api_key: Option<String>,
}

impl Secrets {
    pub fn from_env(config: &Config) -> Result<Self, CliError> {
        Self::from_lookup(config, |name| std::env::var(name).ok())
    }

    pub fn from_lookup(
        config: &Config,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, CliError> {
        let required = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| CliError::Config(format!("environment variable {name} is not set")))
        };

        let credentials = Credentials {
            app_key: required("KIS_APP_KEY")?,
            app_secret: required("KIS_APP_SECRET")?,
            account_number: required("KIS_CANO")?,
            account_product_code: required("KIS_ACNT_PRDT_CD")?,
        };

        let environment = match lookup("KIS_MOCK") {
            Some(flag) => parse_mock_flag(&flag)?,
            None => config.broker.environment,
        };

        let gemini_api_key = lookup("GEMINI_API_KEY")
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        Ok(Self {
            credentials,
            environment,
            gemini_api_key,
        })
    }
}

fn parse_mock_flag(raw: &str) -> Result<Environment, CliError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(Environment::Paper),
        "false" | "0" | "no" => Ok(Environment::Live),
        other => Err(CliError::Config(format!(
            "KIS_MOCK must be true or false, got '{other}'"
        ))),
    }
}
