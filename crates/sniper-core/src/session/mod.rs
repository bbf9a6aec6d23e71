//! Session orchestration: build the watchlist, poll for breakouts, act,
//! liquidate at the close.
//!
//! Everything a session needs is passed in through [`SessionContext`]; there
//! is no global state. Each session runs inside a `session` tracing span
//! carrying a fresh id and the market, so every log line it emits can be
//! attributed.

mod watchlist;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::broker::BrokerClient;
use crate::clock::Clock;
use crate::domain::{Market, Symbol};
use crate::market_clock::{MarketClock, Session};
use crate::sentiment::SentimentFilter;
use crate::strategy::{
    breakout_target, chronological, moving_average, prior_session_bar, trend_filter, DEFAULT_K,
    TREND_WINDOW,
};
use crate::{BrokerError, ValidationError};

pub use watchlist::{WatchStatus, WatchTarget, Watchlist};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session aborted: {0}")]
    Auth(#[source] BrokerError),
    #[error("no broker configured for the {0} market")]
    NoVenue(Market),
}

/// Tunables for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub quantity: u32,
    pub k: f64,
    pub ma_window: usize,
    pub poll_interval: Duration,
    /// Pause before a ticker whose breakout was vetoed is checked again.
    pub rejection_cooldown: Duration,
    /// Sell a bought ticker once its change from entry is at or below this
    /// percentage (e.g. `-3.0`). Disabled when `None`.
    pub stop_loss_pct: Option<f64>,
}

impl SessionSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.quantity == 0 {
            return Err(ValidationError::ZeroQuantity);
        }
        if !self.k.is_finite() || self.k <= 0.0 || self.k > 1.0 {
            return Err(ValidationError::InvalidK { value: self.k });
        }
        if let Some(threshold) = self.stop_loss_pct {
            if !threshold.is_finite() {
                return Err(ValidationError::NonFiniteValue {
                    field: "stop_loss_pct",
                });
            }
        }
        Ok(())
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            quantity: 1,
            k: DEFAULT_K,
            ma_window: TREND_WINDOW,
            poll_interval: Duration::from_millis(100),
            rejection_cooldown: Duration::from_secs(10),
            stop_loss_pct: None,
        }
    }
}

/// Collaborators shared by every session the orchestrator runs.
#[derive(Clone)]
pub struct SessionContext {
    pub clock: Arc<dyn Clock>,
    pub market_clock: MarketClock,
    pub sentiment: Arc<dyn SentimentFilter>,
    pub settings: SessionSettings,
}

/// Broker and ticker universe for one market.
#[derive(Clone)]
pub struct Venue {
    pub broker: Arc<dyn BrokerClient>,
    pub universe: Vec<Symbol>,
}

impl Venue {
    pub fn new(broker: Arc<dyn BrokerClient>, universe: Vec<Symbol>) -> Self {
        Self { broker, universe }
    }

    pub fn market(&self) -> Market {
        self.broker.market()
    }
}

/// Counters for one finished session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub market: Market,
    pub watchlist: usize,
    pub polls: u64,
    pub breakouts: u32,
    pub rejections: u32,
    pub buys: u32,
    pub failed_buys: u32,
    pub stop_outs: u32,
    pub liquidations: u32,
}

impl SessionReport {
    fn new(session_id: Uuid, market: Market) -> Self {
        Self {
            session_id,
            market,
            watchlist: 0,
            polls: 0,
            breakouts: 0,
            rejections: 0,
            buys: 0,
            failed_buys: 0,
            stop_outs: 0,
            liquidations: 0,
        }
    }
}

pub struct Orchestrator {
    context: SessionContext,
    venues: BTreeMap<Market, Venue>,
    completed: Option<Market>,
}

impl Orchestrator {
    pub fn new(context: SessionContext) -> Self {
        Self {
            context,
            venues: BTreeMap::new(),
            completed: None,
        }
    }

    /// Registers the venue for its broker's market, replacing any previous one.
    pub fn with_venue(mut self, venue: Venue) -> Self {
        self.venues.insert(venue.market(), venue);
        self
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn venue(&self, market: Market) -> Option<&Venue> {
        self.venues.get(&market)
    }

    /// Scheduler entry point.
    ///
    /// Runs a session when the clock reports an open market that has not had
    /// one yet in the current window. Returns `Ok(None)` when there is nothing
    /// to do.
    pub async fn tick(&mut self) -> Result<Option<SessionReport>, SessionError> {
        let session = self
            .context
            .market_clock
            .session_at(self.context.clock.now_utc());

        let Session::Open(market) = session else {
            self.completed = None;
            return Ok(None);
        };
        if self.completed == Some(market) {
            return Ok(None);
        }
        if !self.venues.contains_key(&market) {
            debug!(%market, "market open but no venue configured");
            self.completed = Some(market);
            return Ok(None);
        }

        let outcome = self.run_session(market).await;
        self.completed = Some(market);
        outcome.map(Some)
    }

    /// Run one full session for `market` now, regardless of schedule.
    pub async fn run_session(&self, market: Market) -> Result<SessionReport, SessionError> {
        let venue = self.venue(market).ok_or(SessionError::NoVenue(market))?;
        let session_id = Uuid::new_v4();
        let span = info_span!("session", id = %session_id, %market);

        async move {
            info!(universe = venue.universe.len(), "starting trading session");
            let outcome = self.drive(venue, market, session_id).await;
            match &outcome {
                Ok(report) => info!(
                    watchlist = report.watchlist,
                    breakouts = report.breakouts,
                    buys = report.buys,
                    liquidations = report.liquidations,
                    "session finished"
                ),
                Err(error) => error!(%error, "session aborted"),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        venue: &Venue,
        market: Market,
        session_id: Uuid,
    ) -> Result<SessionReport, SessionError> {
        let mut report = SessionReport::new(session_id, market);

        venue.broker.authenticate().await.map_err(SessionError::Auth)?;

        let mut watchlist = self.build_watchlist(venue).await?;
        report.watchlist = watchlist.len();
        if watchlist.is_empty() {
            info!("no tickers qualified; ending session early");
            return Ok(report);
        }
        info!(watchlist = ?watchlist.symbols(), "watchlist ready");

        let monitored = self.monitor(venue, market, &mut watchlist, &mut report).await;

        info!("session closing; liquidating open positions");
        report.liquidations =
            liquidate(venue.broker.as_ref(), &mut watchlist, self.context.settings.quantity).await;

        monitored.map(|()| report)
    }

    /// Analyze every ticker in the venue's universe and keep the bullish ones.
    ///
    /// A ticker with missing data is skipped; only authentication failures
    /// abort.
    pub async fn build_watchlist(&self, venue: &Venue) -> Result<Watchlist, SessionError> {
        let mut watchlist = Watchlist::new();

        for symbol in &venue.universe {
            match self.analyze(venue.broker.as_ref(), symbol).await {
                Ok(Some(target)) => {
                    watchlist.insert(target);
                }
                Ok(None) => {}
                Err(error) if error.is_fatal() => return Err(SessionError::Auth(error)),
                Err(error) => {
                    warn!(symbol = %symbol, %error, "missing data; skipping ticker");
                }
            }
        }

        Ok(watchlist)
    }

    async fn analyze(
        &self,
        broker: &dyn BrokerClient,
        symbol: &Symbol,
    ) -> Result<Option<WatchTarget>, BrokerError> {
        let settings = &self.context.settings;
        info!(symbol = %symbol, "analyzing ticker");

        let bars = chronological(broker.daily_ohlc(symbol).await?);
        let current = broker.current_price(symbol).await?;

        let today = broker.market().trading_date(self.context.clock.now_utc());
        let closes: Vec<f64> = bars
            .iter()
            .filter(|bar| bar.date < today)
            .map(|bar| bar.close)
            .collect();
        let ma = moving_average(&closes, settings.ma_window);
        info!(symbol = %symbol, current, ma = ?ma, "trend check");

        if !trend_filter(current, ma) {
            info!(symbol = %symbol, "price not above moving average; skipping");
            return Ok(None);
        }

        let quote = broker.quote(symbol).await?;
        let today_open = if quote.has_opened() {
            quote.open
        } else {
            warn!(symbol = %symbol, "market not fully open (open=0); using current price as open");
            current
        };

        let Some(target) = breakout_target(today_open, prior_session_bar(&bars, today), settings.k)
        else {
            warn!(symbol = %symbol, "no prior session bar; skipping");
            return Ok(None);
        };

        info!(symbol = %symbol, target, open = today_open, "bullish; watching for breakout");
        Ok(Some(WatchTarget::new(symbol.clone(), target)))
    }

    async fn monitor(
        &self,
        venue: &Venue,
        market: Market,
        watchlist: &mut Watchlist,
        report: &mut SessionReport,
    ) -> Result<(), SessionError> {
        let clock = &self.context.clock;

        while self.context.market_clock.session_at(clock.now_utc()) == Session::Open(market) {
            report.polls += 1;
            for target in watchlist.iter_mut() {
                self.poll_target(venue.broker.as_ref(), target, report).await?;
            }
            clock.sleep(self.context.settings.poll_interval).await;
        }

        Ok(())
    }

    async fn poll_target(
        &self,
        broker: &dyn BrokerClient,
        target: &mut WatchTarget,
        report: &mut SessionReport,
    ) -> Result<(), SessionError> {
        match target.status() {
            WatchStatus::Sold => return Ok(()),
            WatchStatus::Bought => return self.check_stop_loss(broker, target, report).await,
            WatchStatus::Monitoring => {}
        }

        let clock = &self.context.clock;
        if target.cooling_down(clock.monotonic()) {
            return Ok(());
        }

        let symbol = target.symbol().clone();
        let price = match broker.current_price(&symbol).await {
            Ok(price) => price,
            Err(error) => return skip_or_abort(&symbol, error),
        };
        if !target.is_breakout(price) {
            return Ok(());
        }

        report.breakouts += 1;
        info!(
            symbol = %symbol,
            price,
            target = target.target_price(),
            "breakout detected; consulting sentiment gate"
        );

        let verdict = self.context.sentiment.evaluate().await;
        info!(
            symbol = %symbol,
            risk = %verdict.risk_level,
            can_buy = verdict.can_buy,
            reason = %verdict.reason,
            "sentiment verdict"
        );

        if !verdict.can_buy {
            report.rejections += 1;
            let cooldown = self.context.settings.rejection_cooldown;
            target.start_cooldown(clock.monotonic() + cooldown);
            info!(
                symbol = %symbol,
                cooldown_secs = cooldown.as_secs(),
                "buy vetoed by sentiment gate"
            );
            return Ok(());
        }

        let quantity = self.context.settings.quantity;
        match broker.buy_market_order(&symbol, quantity).await {
            Ok(receipt) if receipt.is_success() => {
                target.mark_bought(price);
                report.buys += 1;
                info!(
                    symbol = %symbol,
                    quantity,
                    limit = receipt.limit_price,
                    order = receipt.order_number.as_deref().unwrap_or("-"),
                    "buy accepted"
                );
            }
            Ok(receipt) => {
                report.failed_buys += 1;
                error!(
                    symbol = %symbol,
                    code = receipt.result_code.as_deref().unwrap_or("-"),
                    message = receipt.message.as_deref().unwrap_or("-"),
                    "buy rejected; will retry on a later tick"
                );
            }
            Err(error) if error.is_fatal() => return Err(SessionError::Auth(error)),
            Err(error) => {
                report.failed_buys += 1;
                error!(symbol = %symbol, %error, "buy failed; will retry on a later tick");
            }
        }

        Ok(())
    }

    async fn check_stop_loss(
        &self,
        broker: &dyn BrokerClient,
        target: &mut WatchTarget,
        report: &mut SessionReport,
    ) -> Result<(), SessionError> {
        let Some(threshold) = self.context.settings.stop_loss_pct else {
            return Ok(());
        };

        let symbol = target.symbol().clone();
        let price = match broker.current_price(&symbol).await {
            Ok(price) => price,
            Err(error) => return skip_or_abort(&symbol, error),
        };
        let Some(change) = target.change_pct(price) else {
            return Ok(());
        };
        if change > threshold {
            return Ok(());
        }

        warn!(symbol = %symbol, price, change_pct = change, "stop-loss triggered; selling");
        sell_once(broker, target, self.context.settings.quantity).await;
        report.stop_outs += 1;
        Ok(())
    }
}

/// Sell every bought ticker once and mark it sold. Tickers already sold are
/// left alone, so calling this again issues no further orders.
///
/// Best effort: failed sells are logged, not retried. Returns the number of
/// sell orders sent.
pub async fn liquidate(
    broker: &dyn BrokerClient,
    watchlist: &mut Watchlist,
    quantity: u32,
) -> u32 {
    let mut sent = 0;
    for target in watchlist.iter_mut() {
        if target.status() != WatchStatus::Bought {
            continue;
        }
        sell_once(broker, target, quantity).await;
        sent += 1;
    }
    sent
}

async fn sell_once(broker: &dyn BrokerClient, target: &mut WatchTarget, quantity: u32) {
    let symbol = target.symbol().clone();
    target.mark_sold();

    match broker.sell_market_order(&symbol, quantity).await {
        Ok(receipt) if receipt.is_success() => {
            info!(symbol = %symbol, quantity, limit = receipt.limit_price, "sell accepted");
        }
        Ok(receipt) => error!(
            symbol = %symbol,
            code = receipt.result_code.as_deref().unwrap_or("-"),
            message = receipt.message.as_deref().unwrap_or("-"),
            "sell rejected; position may remain open"
        ),
        Err(error) => error!(symbol = %symbol, %error, "sell failed; position may remain open"),
    }
}

fn skip_or_abort(symbol: &Symbol, error: BrokerError) -> Result<(), SessionError> {
    if error.is_fatal() {
        return Err(SessionError::Auth(error));
    }
    debug!(symbol = %symbol, %error, "price unavailable this tick");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert_eq!(SessionSettings::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_out_of_range_k_and_zero_quantity() {
        let settings = SessionSettings {
            k: 1.5,
            ..SessionSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ValidationError::InvalidK { .. })
        ));

        let settings = SessionSettings {
            quantity: 0,
            ..SessionSettings::default()
        };
        assert_eq!(settings.validate(), Err(ValidationError::ZeroQuantity));
    }
}
