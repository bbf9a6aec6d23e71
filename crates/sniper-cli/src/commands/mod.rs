mod balance;
mod check;
mod run;
mod session;
mod stream;

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use sniper_core::{
    BrokerClient, Clock, DomesticProfile, GeminiSentiment, HttpClient, KisClient, Market,
    Orchestrator, OverseasProfile, RateLimiter, ReqwestHttpClient, SentimentFilter,
    SessionContext, StaticSentiment, SystemClock, Venue,
};

use crate::cli::{Cli, Command};
use crate::config::{Config, Secrets};
use crate::error::CliError;

pub async fn run(cli: &Cli, config: &Config) -> Result<(), CliError> {
    let services = Services::from_env(config)?;

    match &cli.command {
        Command::Run => run::run(&services).await,
        Command::Session(args) => session::run(&services, args.market).await,
        Command::Check(args) => check::run(&services, args.market).await,
        Command::Balance(args) => balance::run(&services, args.market).await,
        Command::Stream(args) => stream::run(&services, args.market).await,
    }
}

/// Shared runtime pieces built once per invocation.
pub struct Services {
    pub config: Config,
    pub secrets: Secrets,
    pub clock: Arc<dyn Clock>,
    pub http: Arc<dyn HttpClient>,
    /// One budget per app key, shared by both market clients.
    pub limiter: Arc<RateLimiter>,
}

impl Services {
    pub fn from_env(config: &Config) -> Result<Self, CliError> {
        let secrets = Secrets::from_env(config)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
        let limiter = Arc::new(RateLimiter::new(
            config.broker.rate_limit_calls,
            config.rate_limit_period(),
            Arc::clone(&clock),
        )?);

        info!(environment = %secrets.environment, "broker credentials loaded");

        Ok(Self {
            config: config.clone(),
            secrets,
            clock,
            http,
            limiter,
        })
    }

    pub fn broker(&self, market: Market) -> Result<Arc<dyn BrokerClient>, CliError> {
        let pricing = self.config.pricing()?;
        let environment = self.secrets.environment;
        let credentials = self.secrets.credentials.clone();
        let http = Arc::clone(&self.http);
        let clock = Arc::clone(&self.clock);
        let limiter = Arc::clone(&self.limiter);

        let broker: Arc<dyn BrokerClient> = match market {
            Market::Overseas => Arc::new(
                KisClient::new(
                    OverseasProfile::new(self.config.broker.us_exchange),
                    environment,
                    credentials,
                    http,
                    clock,
                    limiter,
                )
                .with_pricing(pricing),
            ),
            Market::Domestic => Arc::new(
                KisClient::new(DomesticProfile, environment, credentials, http, clock, limiter)
                    .with_pricing(pricing),
            ),
        };
        Ok(broker)
    }

    pub fn venue(&self, market: Market) -> Result<Venue, CliError> {
        let universe = self.config.markets.get(market).symbols(market)?;
        Ok(Venue::new(self.broker(market)?, universe))
    }

    pub fn sentiment(&self) -> Arc<dyn SentimentFilter> {
        let settings = &self.config.sentiment;
        match (&self.secrets.gemini_api_key, settings.enabled) {
            (Some(api_key), true) => Arc::new(
                GeminiSentiment::new(Arc::clone(&self.http), api_key.clone())
                    .with_model(settings.model.clone())
                    .with_feed_url(settings.feed_url.clone()),
            ),
            (None, true) => {
                tracing::warn!("GEMINI_API_KEY not set; sentiment gate disabled");
                Arc::new(StaticSentiment::approve())
            }
            (_, false) => Arc::new(StaticSentiment::approve()),
        }
    }

    pub fn orchestrator(&self, markets: &[Market]) -> Result<Orchestrator, CliError> {
        let context = SessionContext {
            clock: Arc::clone(&self.clock),
            market_clock: self.config.market_clock()?,
            sentiment: self.sentiment(),
            settings: self.config.session_settings(),
        };

        let mut orchestrator = Orchestrator::new(context);
        for market in markets {
            orchestrator = orchestrator.with_venue(self.venue(*market)?);
        }
        Ok(orchestrator)
    }
}

/// Missing numbers are shown as `"N/A"`.
pub fn number_or_na(value: Option<f64>) -> Value {
    value.map_or_else(|| Value::from("N/A"), Value::from)
}

pub fn print_json(value: &impl serde::Serialize) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
