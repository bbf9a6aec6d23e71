//! Broker contract and the KIS Open API implementation.
//!
//! [`BrokerClient`] is the single contract the session orchestrator talks to.
//! Both markets are served by one generic [`KisClient`]; the market-specific
//! parts (transaction ids, request shaping, payload parsing, order pricing)
//! live in a [`MarketProfile`].

pub mod auth;
pub mod kis;
pub mod profile;
pub mod transaction;

use std::future::Future;
use std::pin::Pin;

use crate::domain::{BalanceSnapshot, Bar, ForeignBalance, Market, OrderReceipt, Quote, Symbol};
use crate::BrokerError;

pub use auth::{AuthSession, Credentials, TokenManager};
pub use kis::{DomesticClient, KisClient, OverseasClient};
pub use profile::{DomesticProfile, MarketProfile, OrderPricing, OverseasProfile, UsExchange};
pub use transaction::{transaction_id, Operation};

pub type BrokerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BrokerError>> + Send + 'a>>;

/// Operations shared by every market's broker client.
///
/// Every call is throttled by the client's rate limiter and transparently
/// refreshes the access token first. Failures come back as [`BrokerError`];
/// only [`BrokerErrorKind::Auth`](crate::BrokerErrorKind::Auth) is fatal.
pub trait BrokerClient: Send + Sync {
    fn market(&self) -> Market;

    /// Obtain an access token now instead of on the first call.
    fn authenticate(&self) -> BrokerFuture<'_, ()>;

    fn current_price<'a>(&'a self, symbol: &'a Symbol) -> BrokerFuture<'a, f64>;

    fn quote<'a>(&'a self, symbol: &'a Symbol) -> BrokerFuture<'a, Quote>;

    /// Daily bars, oldest first.
    fn daily_ohlc<'a>(&'a self, symbol: &'a Symbol) -> BrokerFuture<'a, Vec<Bar>>;

    /// Marketable limit buy priced above the current price.
    ///
    /// `Ok` only means the venue answered; inspect
    /// [`OrderReceipt::is_success`] for the business outcome.
    fn buy_market_order<'a>(
        &'a self,
        symbol: &'a Symbol,
        quantity: u32,
    ) -> BrokerFuture<'a, OrderReceipt>;

    /// Marketable limit sell priced below the current price.
    fn sell_market_order<'a>(
        &'a self,
        symbol: &'a Symbol,
        quantity: u32,
    ) -> BrokerFuture<'a, OrderReceipt>;

    fn balance(&self) -> BrokerFuture<'_, BalanceSnapshot>;

    fn foreign_balance(&self) -> BrokerFuture<'_, ForeignBalance> {
        let market = self.market();
        Box::pin(async move { Err(BrokerError::unsupported(market, "foreign_balance")) })
    }
}
