//! Market profiles: the per-market half of the KIS client.
//!
//! A profile shapes requests (paths, query parameters, order bodies), parses
//! the venue's payloads into domain types, and prices marketable limit
//! orders. Token handling, throttling and transport stay in
//! [`KisClient`](super::KisClient).

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use time::macros::format_description;
use time::Date;

use crate::broker::auth::Credentials;
use crate::broker::transaction::Operation;
use crate::domain::{
    BalanceSnapshot, Bar, ForeignBalance, Market, OrderSide, Position, Quote, Symbol,
};
use crate::http_client::HttpMethod;
use crate::strategy::chronological;
use crate::{BrokerError, ValidationError};

/// Default distance of a marketable limit from the current price.
pub const DEFAULT_SLIPPAGE: f64 = 0.01;

/// Currency the foreign balance is reported in.
pub const FOREIGN_CURRENCY: &str = "USD";

/// One venue request, before authentication and transport headers are added.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueCall {
    pub operation: Operation,
    pub method: HttpMethod,
    pub path: &'static str,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl VenueCall {
    fn get(operation: Operation, path: &'static str) -> Self {
        Self {
            operation,
            method: HttpMethod::Get,
            path,
            query: Vec::new(),
            body: None,
        }
    }

    fn post(operation: Operation, path: &'static str, body: Value) -> Self {
        Self {
            operation,
            method: HttpMethod::Post,
            path,
            query: Vec::new(),
            body: Some(body),
        }
    }

    fn param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.push((name.to_owned(), value.into()));
        self
    }
}

/// Marketable-limit emulation of market orders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderPricing {
    slippage: f64,
}

impl OrderPricing {
    pub fn new(slippage: f64) -> Result<Self, ValidationError> {
        if !slippage.is_finite() || !(0.0..1.0).contains(&slippage) {
            return Err(ValidationError::InvalidSlippage { value: slippage });
        }
        Ok(Self { slippage })
    }

    pub const fn slippage(&self) -> f64 {
        self.slippage
    }

    /// `current * (1 + slippage)` for buys, `current * (1 - slippage)` for sells.
    pub fn marketable_limit(&self, side: OrderSide, current_price: f64) -> f64 {
        match side {
            OrderSide::Buy => current_price * (1.0 + self.slippage),
            OrderSide::Sell => current_price * (1.0 - self.slippage),
        }
    }
}

impl Default for OrderPricing {
    fn default() -> Self {
        Self {
            slippage: DEFAULT_SLIPPAGE,
        }
    }
}

pub trait MarketProfile: Send + Sync + 'static {
    fn market(&self) -> Market;

    /// Headers sent on every call besides auth and `tr_id`.
    fn extra_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    fn price_call(&self, symbol: &Symbol) -> VenueCall;
    fn parse_price(&self, payload: &Value) -> Result<f64, BrokerError>;

    fn quote_call(&self, symbol: &Symbol) -> VenueCall;
    fn parse_quote(&self, payload: &Value) -> Result<Quote, BrokerError>;

    fn daily_call(&self, symbol: &Symbol, today: Date) -> VenueCall;
    /// Bars oldest first.
    fn parse_daily(&self, payload: &Value) -> Result<Vec<Bar>, BrokerError>;

    /// Venue-acceptable limit price for an order against `current_price`.
    fn limit_price(&self, pricing: &OrderPricing, side: OrderSide, current_price: f64) -> f64;
    fn order_call(
        &self,
        account: &Credentials,
        symbol: &Symbol,
        side: OrderSide,
        quantity: u32,
        limit_price: f64,
    ) -> VenueCall;

    fn balance_call(&self, account: &Credentials) -> VenueCall;
    fn parse_balance(&self, payload: &Value) -> Result<BalanceSnapshot, BrokerError>;

    /// `None` when the market has no foreign-currency balance.
    fn foreign_balance_call(&self, _account: &Credentials) -> Option<VenueCall> {
        None
    }

    fn parse_foreign_balance(&self, _payload: &Value) -> Result<ForeignBalance, BrokerError> {
        Err(BrokerError::unsupported(self.market(), "foreign_balance"))
    }
}

/// US listing venue. Quotations and orders use different code sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsExchange {
    #[default]
    Nasdaq,
    Nyse,
    Amex,
}

impl UsExchange {
    pub const fn quote_code(self) -> &'static str {
        match self {
            Self::Nasdaq => "NAS",
            Self::Nyse => "NYS",
            Self::Amex => "AMS",
        }
    }

    pub const fn order_code(self) -> &'static str {
        match self {
            Self::Nasdaq => "NASD",
            Self::Nyse => "NYSE",
            Self::Amex => "AMEX",
        }
    }
}

impl FromStr for UsExchange {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "nasdaq" | "nas" | "nasd" => Ok(Self::Nasdaq),
            "nyse" | "nys" => Ok(Self::Nyse),
            "amex" | "ams" => Ok(Self::Amex),
            other => Err(format!("unknown US exchange '{other}'")),
        }
    }
}

/// US equities and ETFs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverseasProfile {
    exchange: UsExchange,
}

impl OverseasProfile {
    pub const fn new(exchange: UsExchange) -> Self {
        Self { exchange }
    }

    pub const fn exchange(&self) -> UsExchange {
        self.exchange
    }
}

impl MarketProfile for OverseasProfile {
    fn market(&self) -> Market {
        Market::Overseas
    }

    fn price_call(&self, symbol: &Symbol) -> VenueCall {
        VenueCall::get(Operation::CurrentPrice, "/uapi/overseas-price/v1/quotations/price")
            .param("AUTH", "")
            .param("EXCD", self.exchange.quote_code())
            .param("SYMB", symbol.as_str())
    }

    fn parse_price(&self, payload: &Value) -> Result<f64, BrokerError> {
        positive(output(payload)?, "last")
    }

    fn quote_call(&self, symbol: &Symbol) -> VenueCall {
        VenueCall::get(Operation::Quote, "/uapi/overseas-price/v1/quotations/price-detail")
            .param("AUTH", "")
            .param("EXCD", self.exchange.quote_code())
            .param("SYMB", symbol.as_str())
    }

    fn parse_quote(&self, payload: &Value) -> Result<Quote, BrokerError> {
        let fields = output(payload)?;
        build_quote(
            number(fields, "last")?,
            optional_number(fields, "open").unwrap_or(0.0),
            optional_number(fields, "high").unwrap_or(0.0),
            optional_number(fields, "low").unwrap_or(0.0),
            optional_number(fields, "base").unwrap_or(0.0),
        )
    }

    fn daily_call(&self, symbol: &Symbol, today: Date) -> VenueCall {
        VenueCall::get(Operation::DailyPrice, "/uapi/overseas-price/v1/quotations/dailyprice")
            .param("AUTH", "")
            .param("EXCD", self.exchange.quote_code())
            .param("SYMB", symbol.as_str())
            .param("GUBN", "0")
            .param("BYMD", compact_date(today))
            .param("MODP", "1")
    }

    fn parse_daily(&self, payload: &Value) -> Result<Vec<Bar>, BrokerError> {
        let rows = array(payload, "output2")?;
        parse_bars(rows, ["xymd", "open", "high", "low", "clos"])
    }

    fn limit_price(&self, pricing: &OrderPricing, side: OrderSide, current_price: f64) -> f64 {
        (pricing.marketable_limit(side, current_price) * 100.0).round() / 100.0
    }

    fn order_call(
        &self,
        account: &Credentials,
        symbol: &Symbol,
        side: OrderSide,
        quantity: u32,
        limit_price: f64,
    ) -> VenueCall {
        let operation = match side {
            OrderSide::Buy => Operation::Buy,
            OrderSide::Sell => Operation::Sell,
        };
        VenueCall::post(
            operation,
            "/uapi/overseas-stock/v1/trading/order",
            json!({
                "CANO": account.account_number,
                "ACNT_PRDT_CD": account.account_product_code,
                "OVRS_EXCG_CD": self.exchange.order_code(),
                "PDNO": symbol.as_str(),
                "ORD_QTY": quantity.to_string(),
                "OVRS_ORD_UNPR": format!("{limit_price:.2}"),
                "ORD_SVR_DVSN_CD": "0",
                "ORD_DVSN": "00",
            }),
        )
    }

    fn balance_call(&self, account: &Credentials) -> VenueCall {
        VenueCall::get(Operation::Balance, "/uapi/overseas-stock/v1/trading/inquire-balance")
            .param("CANO", account.account_number.as_str())
            .param("ACNT_PRDT_CD", account.account_product_code.as_str())
            .param("OVRS_EXCG_CD", self.exchange.order_code())
            .param("TR_CRCY_CD", FOREIGN_CURRENCY)
            .param("CTX_AREA_FK200", "")
            .param("CTX_AREA_NK200", "")
    }

    fn parse_balance(&self, payload: &Value) -> Result<BalanceSnapshot, BrokerError> {
        let positions = parse_positions(
            payload,
            PositionFields {
                symbol: "ovrs_pdno",
                name: "ovrs_item_name",
                quantity: "ovrs_cblc_qty",
                average_price: "pchs_avg_pric",
                current_price: "now_pric2",
                profit_pct: "evlu_pfls_rt",
            },
        )?;
        let total_evaluation = positions
            .iter()
            .map(|position| position.current_price.map(|price| price * position.quantity))
            .sum::<Option<f64>>();

        Ok(BalanceSnapshot {
            market: Market::Overseas,
            cash: None,
            total_evaluation,
            positions,
        })
    }

    fn foreign_balance_call(&self, account: &Credentials) -> Option<VenueCall> {
        Some(
            VenueCall::get(
                Operation::ForeignBalance,
                "/uapi/overseas-stock/v1/trading/inquire-present-balance",
            )
            .param("CANO", account.account_number.as_str())
            .param("ACNT_PRDT_CD", account.account_product_code.as_str())
            .param("WCRC_FRCR_DVSN_CD", "02")
            .param("NATN_CD", "840")
            .param("TR_MKET_CD", "00")
            .param("INQR_DVSN_CD", "00"),
        )
    }

    fn parse_foreign_balance(&self, payload: &Value) -> Result<ForeignBalance, BrokerError> {
        let entries = match payload.get("output2") {
            Some(Value::Array(entries)) => entries.clone(),
            Some(entry @ Value::Object(_)) => vec![entry.clone()],
            _ => return Ok(ForeignBalance::Unrecognized { raw: payload.clone() }),
        };

        let usd = entries.iter().filter_map(Value::as_object).find(|entry| {
            entry
                .get("crcy_cd")
                .and_then(Value::as_str)
                .is_some_and(|code| code.trim() == FOREIGN_CURRENCY)
        });

        let Some(entry) = usd else {
            return Ok(ForeignBalance::Unrecognized {
                raw: Value::Array(entries),
            });
        };

        match optional_number(entry, "frcr_dncl_amt_2") {
            Some(deposit) => Ok(ForeignBalance::Recognized {
                currency: FOREIGN_CURRENCY.to_owned(),
                deposit,
                withdrawable: optional_number(entry, "frcr_drwg_psbl_amt_1"),
            }),
            None => Ok(ForeignBalance::Unrecognized {
                raw: Value::Object(entry.clone()),
            }),
        }
    }
}

/// KRX-listed stocks and ETFs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DomesticProfile;

impl MarketProfile for DomesticProfile {
    fn market(&self) -> Market {
        Market::Domestic
    }

    fn extra_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[("custtype", "P")]
    }

    fn price_call(&self, symbol: &Symbol) -> VenueCall {
        VenueCall::get(Operation::CurrentPrice, "/uapi/domestic-stock/v1/quotations/inquire-price")
            .param("FID_COND_MRKT_DIV_CODE", "J")
            .param("FID_INPUT_ISCD", symbol.as_str())
    }

    fn parse_price(&self, payload: &Value) -> Result<f64, BrokerError> {
        positive(output(payload)?, "stck_prpr")
    }

    fn quote_call(&self, symbol: &Symbol) -> VenueCall {
        VenueCall {
            operation: Operation::Quote,
            ..self.price_call(symbol)
        }
    }

    fn parse_quote(&self, payload: &Value) -> Result<Quote, BrokerError> {
        let fields = output(payload)?;
        build_quote(
            number(fields, "stck_prpr")?,
            optional_number(fields, "stck_oprc").unwrap_or(0.0),
            optional_number(fields, "stck_hgpr").unwrap_or(0.0),
            optional_number(fields, "stck_lwpr").unwrap_or(0.0),
            optional_number(fields, "stck_sdpr").unwrap_or(0.0),
        )
    }

    fn daily_call(&self, symbol: &Symbol, _today: Date) -> VenueCall {
        VenueCall::get(
            Operation::DailyPrice,
            "/uapi/domestic-stock/v1/quotations/inquire-daily-price",
        )
        .param("FID_COND_MRKT_DIV_CODE", "J")
        .param("FID_INPUT_ISCD", symbol.as_str())
        .param("FID_PERIOD_DIV_CODE", "D")
        .param("FID_ORG_ADJ_PRC", "1")
    }

    fn parse_daily(&self, payload: &Value) -> Result<Vec<Bar>, BrokerError> {
        let rows = array(payload, "output")?;
        parse_bars(
            rows,
            ["stck_bsop_date", "stck_oprc", "stck_hgpr", "stck_lwpr", "stck_clpr"],
        )
    }

    fn limit_price(&self, pricing: &OrderPricing, side: OrderSide, current_price: f64) -> f64 {
        snap_to_krx_tick(pricing.marketable_limit(side, current_price), side)
    }

    fn order_call(
        &self,
        account: &Credentials,
        symbol: &Symbol,
        side: OrderSide,
        quantity: u32,
        limit_price: f64,
    ) -> VenueCall {
        let operation = match side {
            OrderSide::Buy => Operation::Buy,
            OrderSide::Sell => Operation::Sell,
        };
        VenueCall::post(
            operation,
            "/uapi/domestic-stock/v1/trading/order-cash",
            json!({
                "CANO": account.account_number,
                "ACNT_PRDT_CD": account.account_product_code,
                "PDNO": symbol.as_str(),
                "ORD_DVSN": "00",
                "ORD_QTY": quantity.to_string(),
                "ORD_UNPR": format!("{limit_price:.0}"),
            }),
        )
    }

    fn balance_call(&self, account: &Credentials) -> VenueCall {
        VenueCall::get(Operation::Balance, "/uapi/domestic-stock/v1/trading/inquire-balance")
            .param("CANO", account.account_number.as_str())
            .param("ACNT_PRDT_CD", account.account_product_code.as_str())
            .param("AFHR_FLPR_YN", "N")
            .param("OFL_YN", "N")
            .param("INQR_DVSN", "02")
            .param("UNPR_DVSN", "01")
            .param("FUND_STTL_ICLD_YN", "N")
            .param("FNCG_AMT_AUTO_RDPT_YN", "N")
            .param("PRCS_DVSN", "00")
            .param("CTX_AREA_FK100", "")
            .param("CTX_AREA_NK100", "")
    }

    fn parse_balance(&self, payload: &Value) -> Result<BalanceSnapshot, BrokerError> {
        let positions = parse_positions(
            payload,
            PositionFields {
                symbol: "pdno",
                name: "prdt_name",
                quantity: "hldg_qty",
                average_price: "pchs_avg_pric",
                current_price: "prpr",
                profit_pct: "evlu_pfls_rt",
            },
        )?;
        let summary = first_object(payload.get("output2"));

        Ok(BalanceSnapshot {
            market: Market::Domestic,
            cash: summary.and_then(|fields| optional_number(fields, "dnca_tot_amt")),
            total_evaluation: summary.and_then(|fields| optional_number(fields, "tot_evlu_amt")),
            positions,
        })
    }
}

/// KRX price-band tick size.
pub fn krx_tick_size(price: f64) -> f64 {
    match price {
        p if p < 2_000.0 => 1.0,
        p if p < 5_000.0 => 5.0,
        p if p < 20_000.0 => 10.0,
        p if p < 50_000.0 => 50.0,
        p if p < 200_000.0 => 100.0,
        p if p < 500_000.0 => 500.0,
        _ => 1_000.0,
    }
}

/// Buys round up to the next tick, sells round down.
pub fn snap_to_krx_tick(price: f64, side: OrderSide) -> f64 {
    const EPSILON: f64 = 1e-9;
    let tick = krx_tick_size(price);
    let steps = price / tick;
    let snapped = match side {
        OrderSide::Buy => (steps - EPSILON).ceil(),
        OrderSide::Sell => (steps + EPSILON).floor(),
    };
    snapped * tick
}

struct PositionFields {
    symbol: &'static str,
    name: &'static str,
    quantity: &'static str,
    average_price: &'static str,
    current_price: &'static str,
    profit_pct: &'static str,
}

fn parse_positions(payload: &Value, fields: PositionFields) -> Result<Vec<Position>, BrokerError> {
    let rows: &[Value] = match payload.get("output1") {
        Some(Value::Array(rows)) => rows.as_slice(),
        None | Some(Value::Null) => &[],
        Some(_) => return Err(BrokerError::malformed("balance output1 is not a list")),
    };

    let mut positions = Vec::with_capacity(rows.len());
    for row in rows.iter().filter_map(Value::as_object) {
        let Some(symbol) = text(row, fields.symbol) else {
            continue;
        };
        let quantity = optional_number(row, fields.quantity).unwrap_or(0.0);
        if quantity <= 0.0 {
            continue;
        }
        positions.push(Position {
            symbol,
            name: text(row, fields.name),
            quantity,
            average_price: optional_number(row, fields.average_price),
            current_price: optional_number(row, fields.current_price),
            profit_pct: optional_number(row, fields.profit_pct),
        });
    }
    Ok(positions)
}

fn parse_bars(
    rows: &[Value],
    [date, open, high, low, close]: [&str; 5],
) -> Result<Vec<Bar>, BrokerError> {
    let mut bars = Vec::with_capacity(rows.len());
    for row in rows.iter().filter_map(Value::as_object) {
        let Some(raw_date) = text(row, date) else {
            continue;
        };
        let bar = Bar::new(
            parse_compact_date(&raw_date)?,
            number(row, open)?,
            number(row, high)?,
            number(row, low)?,
            number(row, close)?,
        )
        .map_err(|error| BrokerError::malformed(format!("invalid bar for {raw_date}: {error}")))?;
        bars.push(bar);
    }

    if bars.is_empty() {
        return Err(BrokerError::malformed("daily price payload contains no bars"));
    }
    Ok(chronological(bars))
}

fn build_quote(
    last: f64,
    open: f64,
    high: f64,
    low: f64,
    previous_close: f64,
) -> Result<Quote, BrokerError> {
    Quote::new(last, open, high, low, previous_close)
        .map_err(|error| BrokerError::malformed(format!("invalid quote: {error}")))
}

fn output(payload: &Value) -> Result<&Map<String, Value>, BrokerError> {
    first_object(payload.get("output"))
        .ok_or_else(|| BrokerError::malformed("payload has no output object"))
}

fn first_object(value: Option<&Value>) -> Option<&Map<String, Value>> {
    match value? {
        Value::Object(fields) => Some(fields),
        Value::Array(items) => items.first().and_then(Value::as_object),
        _ => None,
    }
}

fn array<'a>(payload: &'a Value, key: &str) -> Result<&'a [Value], BrokerError> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| BrokerError::malformed(format!("payload has no '{key}' list")))
}

fn text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// Venue numbers arrive as strings; plain JSON numbers are accepted too.
fn optional_number(fields: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = match fields.get(key)? {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    value.is_finite().then_some(value)
}

fn number(fields: &Map<String, Value>, key: &str) -> Result<f64, BrokerError> {
    optional_number(fields, key)
        .ok_or_else(|| BrokerError::malformed(format!("field '{key}' is missing or not numeric")))
}

fn positive(fields: &Map<String, Value>, key: &str) -> Result<f64, BrokerError> {
    let value = number(fields, key)?;
    if value <= 0.0 {
        return Err(BrokerError::malformed(format!("field '{key}' has no trade price")));
    }
    Ok(value)
}

fn compact_date(date: Date) -> String {
    format!("{:04}{:02}{:02}", date.year(), u8::from(date.month()), date.day())
}

fn parse_compact_date(raw: &str) -> Result<Date, BrokerError> {
    Date::parse(raw, format_description!("[year][month][day]"))
        .map_err(|error| BrokerError::malformed(format!("invalid bar date '{raw}': {error}")))
}
