//! Scripted collaborators shared by the behavior tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use serde_json::json;
use sniper_core::sentiment::SentimentFuture;
use sniper_core::{
    BalanceSnapshot, Bar, BrokerClient, BrokerError, BrokerFuture, Credentials, HttpClient,
    HttpError, HttpRequest, HttpResponse, Market, OrderReceipt, OrderSide, Quote,
    SentimentFilter, SentimentVerdict, Symbol,
};
use time::{Date, Duration as DateDuration};

// =============================================================================
// HTTP transport
// =============================================================================

type Scripted = Result<HttpResponse, HttpError>;

/// Transport that answers by URL path and records every request.
///
/// Each path holds a queue of answers; the last one repeats once the queue
/// is down to it.
#[derive(Default)]
pub struct ScriptedHttpClient {
    routes: Mutex<Vec<(String, VecDeque<Scripted>)>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer for requests whose URL ends with `path`.
    pub fn route(self, path: &str, answer: Scripted) -> Self {
        {
            let mut routes = self.routes.lock().expect("routes lock");
            match routes.iter_mut().find(|(known, _)| known == path) {
                Some((_, queue)) => queue.push_back(answer),
                None => routes.push((path.to_owned(), VecDeque::from([answer]))),
            }
        }
        self
    }

    pub fn json(self, path: &str, body: serde_json::Value) -> Self {
        self.route(path, Ok(HttpResponse::ok_json(body.to_string())))
    }

    pub fn with_token(self) -> Self {
        self.json(
            "/oauth2/tokenP",
            json!({"access_token": "token-1", "token_type": "Bearer", "expires_in": 86400}),
        )
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.url.ends_with(path))
            .collect()
    }

    fn answer(&self, url: &str) -> Scripted {
        let mut routes = self.routes.lock().expect("routes lock");
        let Some((_, queue)) = routes.iter_mut().find(|(path, _)| url.ends_with(path.as_str()))
        else {
            return Err(HttpError::new(format!("no scripted answer for {url}")));
        };
        if queue.len() > 1 {
            queue.pop_front().expect("non-empty queue")
        } else {
            queue.front().cloned().expect("route has an answer")
        }
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let answer = self.answer(&request.url);
        self.requests.lock().expect("requests lock").push(request);
        Box::pin(async move { answer })
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        app_key: String::from("app-key"),
        app_secret: String::from("app-secret"),
        account_number: String::from("12345678"),
        account_product_code: String::from("01"),
    }
}

// =============================================================================
// Broker
// =============================================================================

struct Ticker {
    bars: Vec<Bar>,
    quote: Quote,
    prices: VecDeque<f64>,
}

/// In-memory broker with per-ticker price scripts.
///
/// Each `current_price` call consumes the next scripted price; the last
/// one repeats. Orders are recorded and answered with the queued receipts
/// (accepted by default).
pub struct ScriptedBroker {
    market: Market,
    tickers: Mutex<HashMap<String, Ticker>>,
    auth_error: Option<BrokerError>,
    price_error: Mutex<Option<BrokerError>>,
    buy_codes: Mutex<VecDeque<&'static str>>,
    buys: Mutex<Vec<String>>,
    sells: Mutex<Vec<String>>,
}

impl ScriptedBroker {
    pub fn new(market: Market) -> Self {
        Self {
            market,
            tickers: Mutex::new(HashMap::new()),
            auth_error: None,
            price_error: Mutex::new(None),
            buy_codes: Mutex::new(VecDeque::new()),
            buys: Mutex::new(Vec::new()),
            sells: Mutex::new(Vec::new()),
        }
    }

    pub fn with_ticker(self, symbol: &str, bars: Vec<Bar>, quote: Quote, prices: &[f64]) -> Self {
        self.tickers.lock().expect("tickers lock").insert(
            symbol.to_owned(),
            Ticker {
                bars,
                quote,
                prices: prices.iter().copied().collect(),
            },
        );
        self
    }

    pub fn failing_auth(mut self, error: BrokerError) -> Self {
        self.auth_error = Some(error);
        self
    }

    /// Result codes for the next buy receipts, e.g. `"1"` for a rejection.
    pub fn with_buy_codes(self, codes: &[&'static str]) -> Self {
        self.buy_codes
            .lock()
            .expect("codes lock")
            .extend(codes.iter().copied());
        self
    }

    /// Make every later `current_price` call fail with `error`.
    pub fn fail_prices_with(&self, error: BrokerError) {
        *self.price_error.lock().expect("price error lock") = Some(error);
    }

    pub fn buys(&self) -> Vec<String> {
        self.buys.lock().expect("buys lock").clone()
    }

    pub fn sells(&self) -> Vec<String> {
        self.sells.lock().expect("sells lock").clone()
    }

    fn next_price(&self, symbol: &Symbol) -> Result<f64, BrokerError> {
        if let Some(error) = self.price_error.lock().expect("price error lock").clone() {
            return Err(error);
        }
        let mut tickers = self.tickers.lock().expect("tickers lock");
        let ticker = tickers
            .get_mut(symbol.as_str())
            .ok_or_else(|| BrokerError::malformed(format!("no data for {symbol}")))?;
        let price = if ticker.prices.len() > 1 {
            ticker.prices.pop_front()
        } else {
            ticker.prices.front().copied()
        };
        price.ok_or_else(|| BrokerError::malformed(format!("no price for {symbol}")))
    }

    fn receipt(side: OrderSide, code: &str) -> OrderReceipt {
        OrderReceipt::from_raw(
            side,
            0.0,
            json!({"rt_cd": code, "msg_cd": "APBK0013", "msg1": "scripted", "output": {"ODNO": "0001"}}),
        )
    }
}

impl BrokerClient for ScriptedBroker {
    fn market(&self) -> Market {
        self.market
    }

    fn authenticate(&self) -> BrokerFuture<'_, ()> {
        let outcome = match &self.auth_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        };
        Box::pin(async move { outcome })
    }

    fn current_price<'a>(&'a self, symbol: &'a Symbol) -> BrokerFuture<'a, f64> {
        let outcome = self.next_price(symbol);
        Box::pin(async move { outcome })
    }

    fn quote<'a>(&'a self, symbol: &'a Symbol) -> BrokerFuture<'a, Quote> {
        let outcome = self
            .tickers
            .lock()
            .expect("tickers lock")
            .get(symbol.as_str())
            .map(|ticker| ticker.quote)
            .ok_or_else(|| BrokerError::malformed(format!("no quote for {symbol}")));
        Box::pin(async move { outcome })
    }

    fn daily_ohlc<'a>(&'a self, symbol: &'a Symbol) -> BrokerFuture<'a, Vec<Bar>> {
        let outcome = self
            .tickers
            .lock()
            .expect("tickers lock")
            .get(symbol.as_str())
            .map(|ticker| ticker.bars.clone())
            .ok_or_else(|| BrokerError::malformed(format!("no bars for {symbol}")));
        Box::pin(async move { outcome })
    }

    fn buy_market_order<'a>(
        &'a self,
        symbol: &'a Symbol,
        _quantity: u32,
    ) -> BrokerFuture<'a, OrderReceipt> {
        self.buys
            .lock()
            .expect("buys lock")
            .push(symbol.as_str().to_owned());
        let code = self
            .buy_codes
            .lock()
            .expect("codes lock")
            .pop_front()
            .unwrap_or("0");
        let receipt = Self::receipt(OrderSide::Buy, code);
        Box::pin(async move { Ok(receipt) })
    }

    fn sell_market_order<'a>(
        &'a self,
        symbol: &'a Symbol,
        _quantity: u32,
    ) -> BrokerFuture<'a, OrderReceipt> {
        self.sells
            .lock()
            .expect("sells lock")
            .push(symbol.as_str().to_owned());
        let receipt = Self::receipt(OrderSide::Sell, "0");
        Box::pin(async move { Ok(receipt) })
    }

    fn balance(&self) -> BrokerFuture<'_, BalanceSnapshot> {
        let snapshot = BalanceSnapshot {
            market: self.market,
            cash: None,
            total_evaluation: None,
            positions: Vec::new(),
        };
        Box::pin(async move { Ok(snapshot) })
    }
}

/// `count` flat bars closing at `close`, on the days before `today`, newest
/// first the way the venue sends them. The newest bar gets `last_high` and
/// `last_low`.
pub fn history(today: Date, count: i64, close: f64, last_high: f64, last_low: f64) -> Vec<Bar> {
    (1..=count)
        .map(|days_back| {
            let date = today - DateDuration::days(days_back);
            if days_back == 1 {
                Bar::new(date, close, last_high, last_low, close).expect("bar")
            } else {
                Bar::new(date, close, close, close, close).expect("bar")
            }
        })
        .collect()
}

pub fn quote(last: f64, open: f64) -> Quote {
    Quote::new(last, open, last.max(open), last.min(open), open).expect("quote")
}

// =============================================================================
// Sentiment
// =============================================================================

/// Sentiment gate answering from a queue of verdicts; the last one repeats.
pub struct ScriptedSentiment {
    verdicts: Mutex<VecDeque<SentimentVerdict>>,
    calls: Mutex<u32>,
}

impl ScriptedSentiment {
    pub fn new(verdicts: Vec<SentimentVerdict>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into()),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().expect("calls lock")
    }
}

impl SentimentFilter for ScriptedSentiment {
    fn headline_digest(&self) -> SentimentFuture<'_, String> {
        Box::pin(async { String::from("- scripted headline: nothing happened") })
    }

    fn assess<'a>(&'a self, _digest: &'a str) -> SentimentFuture<'a, SentimentVerdict> {
        *self.calls.lock().expect("calls lock") += 1;
        let mut verdicts = self.verdicts.lock().expect("verdicts lock");
        let verdict = if verdicts.len() > 1 {
            verdicts.pop_front()
        } else {
            verdicts.front().cloned()
        }
        .unwrap_or_else(|| SentimentVerdict::approve("no verdict scripted"));
        Box::pin(async move { verdict })
    }
}
