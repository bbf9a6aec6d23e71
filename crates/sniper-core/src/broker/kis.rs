use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::broker::auth::{Credentials, TokenManager, TOKEN_EXPIRED_CODE};
use crate::broker::profile::{
    DomesticProfile, MarketProfile, OrderPricing, OverseasProfile, VenueCall,
};
use crate::broker::transaction::transaction_id;
use crate::broker::{BrokerClient, BrokerFuture};
use crate::clock::Clock;
use crate::domain::{
    BalanceSnapshot, Bar, Environment, ForeignBalance, Market, OrderReceipt, OrderSide, Quote,
    Symbol, SUCCESS_RESULT_CODE,
};
use crate::http_client::{HttpAuth, HttpClient, HttpMethod, HttpRequest};
use crate::throttling::RateLimiter;
use crate::BrokerError;

pub const LIVE_BASE_URL: &str = "https://openapi.koreainvestment.com:9443";
pub const PAPER_BASE_URL: &str = "https://openapivts.koreainvestment.com:29443";

pub type OverseasClient = KisClient<OverseasProfile>;
pub type DomesticClient = KisClient<DomesticProfile>;

pub const fn rest_base_url(environment: Environment) -> &'static str {
    match environment {
        Environment::Live => LIVE_BASE_URL,
        Environment::Paper => PAPER_BASE_URL,
    }
}

/// KIS Open API client for one market.
///
/// Token refresh, throttling, transport and result-code checks live here and
/// are shared by both markets; the profile `P` supplies everything that
/// differs per market.
pub struct KisClient<P> {
    profile: P,
    environment: Environment,
    base_url: String,
    credentials: Arc<Credentials>,
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    limiter: Arc<RateLimiter>,
    tokens: TokenManager,
    pricing: OrderPricing,
}

impl<P: MarketProfile> KisClient<P> {
    /// The limiter may be shared with other clients using the same app key.
    pub fn new(
        profile: P,
        environment: Environment,
        credentials: Credentials,
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let base_url = rest_base_url(environment).to_owned();
        let credentials = Arc::new(credentials);
        let tokens = TokenManager::new(
            base_url.clone(),
            Arc::clone(&credentials),
            Arc::clone(&http),
            Arc::clone(&clock),
        );

        Self {
            profile,
            environment,
            base_url,
            credentials,
            http,
            clock,
            limiter,
            tokens,
            pricing: OrderPricing::default(),
        }
    }

    pub fn with_pricing(mut self, pricing: OrderPricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_token_manager(mut self, configure: impl FnOnce(TokenManager) -> TokenManager) -> Self {
        self.tokens = configure(self.tokens);
        self
    }

    pub fn profile(&self) -> &P {
        &self.profile
    }

    pub const fn environment(&self) -> Environment {
        self.environment
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn token_manager(&self) -> &TokenManager {
        &self.tokens
    }

    /// Throttle, authenticate and send one call; returns the decoded body of
    /// any HTTP-successful answer without inspecting its result code.
    async fn send(&self, call: VenueCall) -> Result<Value, BrokerError> {
        let market = self.profile.market();
        let tr_id = transaction_id(market, self.environment, call.operation)
            .ok_or_else(|| BrokerError::unsupported(market, call.operation.as_str()))?;

        self.limiter.wait().await;
        let token = self.tokens.access_token().await?;

        let url = format!("{}{}", self.base_url, call.path);
        let mut request = match call.method {
            HttpMethod::Get => HttpRequest::get(url),
            HttpMethod::Post => HttpRequest::post(url),
        }
        .with_auth(&HttpAuth::BearerToken(token))
        .with_header("content-type", "application/json; charset=utf-8")
        .with_header("appkey", self.credentials.app_key.as_str())
        .with_header("appsecret", self.credentials.app_secret.as_str())
        .with_header("tr_id", tr_id);

        for (name, value) in self.profile.extra_headers() {
            request = request.with_header(*name, *value);
        }
        for (name, value) in call.query {
            request = request.with_query(name, value);
        }
        if let Some(body) = call.body.as_ref() {
            request = request.with_json(body);
        }

        debug!(%market, tr_id, path = call.path, "sending broker request");
        let response = self.http.execute(request).await.map_err(|error| {
            BrokerError::transport(format!("{} request failed: {}", call.path, error.message()))
        })?;

        if !response.is_success() {
            return Err(BrokerError::http_status(response.status, &response.body));
        }

        serde_json::from_str(&response.body).map_err(|error| {
            BrokerError::malformed(format!("{} returned invalid JSON: {error}", call.path))
        })
    }

    /// [`send`](Self::send), then require the success result code.
    async fn query(&self, call: VenueCall) -> Result<Value, BrokerError> {
        let payload = self.send(call).await?;
        let result_code = payload.get("rt_cd").and_then(Value::as_str).map(str::trim);
        if result_code == Some(SUCCESS_RESULT_CODE) {
            return Ok(payload);
        }

        let message_code = payload.get("msg_cd").and_then(Value::as_str).unwrap_or_default();
        let message = payload.get("msg1").and_then(Value::as_str).unwrap_or_default();
        self.note_expired_token(message_code).await;
        Err(BrokerError::business(
            result_code.unwrap_or("missing").to_owned(),
            format!("{} {}", message_code.trim(), message.trim()).trim().to_owned(),
        ))
    }

    async fn note_expired_token(&self, message_code: &str) {
        if message_code.trim() == TOKEN_EXPIRED_CODE {
            self.tokens.invalidate().await;
        }
    }

    async fn place_order(
        &self,
        side: OrderSide,
        symbol: &Symbol,
        quantity: u32,
    ) -> Result<OrderReceipt, BrokerError> {
        if quantity == 0 {
            return Err(BrokerError::malformed("order quantity must be greater than zero"));
        }

        let current = self.current_price_inner(symbol).await?;
        let limit = self.profile.limit_price(&self.pricing, side, current);
        let call = self
            .profile
            .order_call(&self.credentials, symbol, side, quantity, limit);

        let payload = self.send(call).await?;
        let receipt = OrderReceipt::from_raw(side, limit, payload);
        if !receipt.is_success() {
            self.note_expired_token(receipt.message_code.as_deref().unwrap_or_default())
                .await;
            warn!(
                symbol = %symbol,
                side = side.as_str(),
                code = receipt.message_code.as_deref().unwrap_or("-"),
                message = receipt.message.as_deref().unwrap_or("-"),
                "order rejected by venue"
            );
        }
        Ok(receipt)
    }

    async fn current_price_inner(&self, symbol: &Symbol) -> Result<f64, BrokerError> {
        let payload = self.query(self.profile.price_call(symbol)).await?;
        self.profile.parse_price(&payload)
    }
}

impl<P: MarketProfile> BrokerClient for KisClient<P> {
    fn market(&self) -> Market {
        self.profile.market()
    }

    fn authenticate(&self) -> BrokerFuture<'_, ()> {
        Box::pin(async move { self.tokens.access_token().await.map(|_| ()) })
    }

    fn current_price<'a>(&'a self, symbol: &'a Symbol) -> BrokerFuture<'a, f64> {
        Box::pin(self.current_price_inner(symbol))
    }

    fn quote<'a>(&'a self, symbol: &'a Symbol) -> BrokerFuture<'a, Quote> {
        Box::pin(async move {
            let payload = self.query(self.profile.quote_call(symbol)).await?;
            self.profile.parse_quote(&payload)
        })
    }

    fn daily_ohlc<'a>(&'a self, symbol: &'a Symbol) -> BrokerFuture<'a, Vec<Bar>> {
        Box::pin(async move {
            let today = self.clock.now_utc().date();
            let payload = self.query(self.profile.daily_call(symbol, today)).await?;
            self.profile.parse_daily(&payload)
        })
    }

    fn buy_market_order<'a>(
        &'a self,
        symbol: &'a Symbol,
        quantity: u32,
    ) -> BrokerFuture<'a, OrderReceipt> {
        Box::pin(self.place_order(OrderSide::Buy, symbol, quantity))
    }

    fn sell_market_order<'a>(
        &'a self,
        symbol: &'a Symbol,
        quantity: u32,
    ) -> BrokerFuture<'a, OrderReceipt> {
        Box::pin(self.place_order(OrderSide::Sell, symbol, quantity))
    }

    fn balance(&self) -> BrokerFuture<'_, BalanceSnapshot> {
        Box::pin(async move {
            let payload = self.query(self.profile.balance_call(&self.credentials)).await?;
            self.profile.parse_balance(&payload)
        })
    }

    fn foreign_balance(&self) -> BrokerFuture<'_, ForeignBalance> {
        Box::pin(async move {
            let Some(call) = self.profile.foreign_balance_call(&self.credentials) else {
                return Err(BrokerError::unsupported(self.market(), "foreign_balance"));
            };
            let payload = self.query(call).await?;
            self.profile.parse_foreign_balance(&payload)
        })
    }
}
