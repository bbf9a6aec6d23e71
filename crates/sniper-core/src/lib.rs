//! # Sniper Core
//!
//! Session engine for a volatility-breakout trading bot running against the
//! KIS Open API in two markets (US and KRX), gated by a news-sentiment check.
//!
//! ## Overview
//!
//! - **Strategy engine**: moving average, trend filter and breakout target
//! - **Market clock**: wall-clock time to the active trading session
//! - **Broker contract** with one generic KIS client and per-market profiles
//! - **Sliding-window rate limiter** shared by all calls of an app key
//! - **Sentiment gate** backed by an RSS digest and an LLM verdict
//! - **Session orchestrator** driving Monitoring → Bought → Sold per ticker
//! - **Streaming price feed** over the venue's websocket channel
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`broker`] | `BrokerClient` contract, KIS client, auth, transaction ids |
//! | [`clock`] | Injectable time source (`SystemClock`, `ManualClock`) |
//! | [`domain`] | Domain models (Symbol, Bar, Quote, OrderReceipt, balances) |
//! | [`error`] | Validation and broker error types |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`market_clock`] | Fixed daily session windows |
//! | [`retry`] | Backoff policies |
//! | [`sentiment`] | Sentiment gate contract and implementations |
//! | [`session`] | Watchlist state machine and orchestrator |
//! | [`strategy`] | Pure breakout calculations |
//! | [`stream`] | Websocket price feed |
//! | [`throttling`] | Sliding-window rate limiter |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Orchestrator   │────▶│  Market Clock    │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ├─────────────▶ Strategy Engine
//!          ├─────────────▶ Sentiment Gate ──▶ HTTP Client
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Broker Client   │────▶│ Rate Limiter     │
//! │ (KisClient<P>)  │     └──────────────────┘
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐
//! │ HTTP Client     │
//! └─────────────────┘
//! ```

pub mod broker;
pub mod clock;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod market_clock;
pub mod retry;
pub mod sentiment;
pub mod session;
pub mod strategy;
pub mod stream;
pub mod throttling;

pub use broker::{
    BrokerClient, BrokerFuture, Credentials, DomesticClient, DomesticProfile, KisClient,
    MarketProfile, OrderPricing, OverseasClient, OverseasProfile, UsExchange,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::*;
pub use error::{BrokerError, BrokerErrorKind, ValidationError};
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient,
};
pub use market_clock::{MarketClock, Session, SessionWindow};
pub use retry::{Backoff, RetryConfig};
pub use sentiment::{
    GeminiSentiment, RiskLevel, SentimentFilter, SentimentVerdict, StaticSentiment,
};
pub use session::{
    Orchestrator, SessionContext, SessionError, SessionReport, SessionSettings, Venue,
    WatchStatus, WatchTarget, Watchlist,
};
pub use stream::{FeedFrame, FeedLayout, PriceFeed, PriceTick, StreamError};
pub use throttling::RateLimiter;
