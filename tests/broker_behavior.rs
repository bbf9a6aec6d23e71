//! Behavior-driven tests for the KIS broker client.
//!
//! These tests verify HOW the client talks to the venue: which transaction
//! ids it sends, how it recovers from token throttling, how failures are
//! classified, and how payloads are normalized.

mod support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use sniper_core::{
    BrokerClient, BrokerErrorKind, DomesticClient, DomesticProfile, Environment, ForeignBalance,
    HttpResponse, KisClient, ManualClock, Market, OverseasClient, OverseasProfile, RateLimiter,
    Symbol, UsExchange,
};
use time::macros::{date, datetime};

use support::{credentials, ScriptedHttpClient};

const PRICE_PATH: &str = "/uapi/overseas-price/v1/quotations/price";
const ORDER_PATH: &str = "/uapi/overseas-stock/v1/trading/order";
const TOKEN_PATH: &str = "/oauth2/tokenP";

struct Harness {
    clock: Arc<ManualClock>,
    http: Arc<ScriptedHttpClient>,
}

impl Harness {
    fn new(http: ScriptedHttpClient) -> Self {
        Self {
            clock: Arc::new(ManualClock::new(datetime!(2024-01-05 14:45 UTC))),
            http: Arc::new(http),
        }
    }

    fn limiter(&self, max_calls: usize) -> Arc<RateLimiter> {
        Arc::new(
            RateLimiter::new(max_calls, Duration::from_secs(1), self.clock.clone())
                .expect("limiter"),
        )
    }

    fn overseas(&self, environment: Environment) -> OverseasClient {
        KisClient::new(
            OverseasProfile::new(UsExchange::Nasdaq),
            environment,
            credentials(),
            self.http.clone(),
            self.clock.clone(),
            self.limiter(15),
        )
    }

    fn domestic(&self) -> DomesticClient {
        KisClient::new(
            DomesticProfile,
            Environment::Paper,
            credentials(),
            self.http.clone(),
            self.clock.clone(),
            self.limiter(15),
        )
    }
}

fn tqqq() -> Symbol {
    Symbol::parse(Market::Overseas, "TQQQ").expect("symbol")
}

fn price_payload(last: &str) -> Value {
    json!({"rt_cd": "0", "msg_cd": "MCA00000", "msg1": "ok", "output": {"last": last}})
}

fn order_accepted() -> Value {
    json!({"rt_cd": "0", "msg_cd": "APBK0013", "msg1": "order accepted", "output": {"ODNO": "0030123"}})
}

fn body_of(request: &sniper_core::HttpRequest) -> Value {
    serde_json::from_str(request.body.as_deref().expect("request body")).expect("json body")
}

// =============================================================================
// Broker: Request Shaping
// =============================================================================

#[tokio::test]
async fn when_paper_account_buys_order_uses_paper_transaction_id_and_marketable_limit() {
    // Given: A paper-account overseas client and a last price of 50.00
    let harness = Harness::new(
        ScriptedHttpClient::new()
            .with_token()
            .json(PRICE_PATH, price_payload("50.0000"))
            .json(ORDER_PATH, order_accepted()),
    );
    let client = harness.overseas(Environment::Paper);

    // When: A market buy is placed
    let receipt = client.buy_market_order(&tqqq(), 3).await.expect("receipt");

    // Then: The order is a limit 1% above last, sent with the paper TR id
    assert!(receipt.is_success());
    assert_eq!(receipt.limit_price, 50.5);
    assert_eq!(receipt.order_number.as_deref(), Some("0030123"));

    let orders = harness.http.requests_to(ORDER_PATH);
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert!(order.url.starts_with("https://openapivts.koreainvestment.com:29443"));
    assert_eq!(order.headers.get("tr_id").map(String::as_str), Some("VTTT1002U"));
    assert_eq!(
        order.headers.get("authorization").map(String::as_str),
        Some("Bearer token-1")
    );

    let body = body_of(order);
    assert_eq!(body["OVRS_ORD_UNPR"], "50.50");
    assert_eq!(body["ORD_QTY"], "3");
    assert_eq!(body["OVRS_EXCG_CD"], "NASD");
    assert_eq!(body["CANO"], "12345678");
}

#[tokio::test]
async fn when_live_account_sells_order_uses_live_transaction_id() {
    // Given: A live-account overseas client
    let harness = Harness::new(
        ScriptedHttpClient::new()
            .with_token()
            .json(PRICE_PATH, price_payload("50.00"))
            .json(ORDER_PATH, order_accepted()),
    );
    let client = harness.overseas(Environment::Live);

    // When: A market sell is placed
    let receipt = client.sell_market_order(&tqqq(), 1).await.expect("receipt");

    // Then: The live sell TR id and a limit 1% below last are used
    assert_eq!(receipt.limit_price, 49.5);
    let order = &harness.http.requests_to(ORDER_PATH)[0];
    assert!(order.url.starts_with("https://openapi.koreainvestment.com:9443"));
    assert_eq!(order.headers.get("tr_id").map(String::as_str), Some("TTTT1006U"));

    // And: Quotation calls use the same TR id in either environment
    let price = &harness.http.requests_to(PRICE_PATH)[0];
    assert_eq!(price.headers.get("tr_id").map(String::as_str), Some("HHDFS00000300"));
    assert_eq!(price.query_param("EXCD"), Some("NAS"));
    assert_eq!(price.query_param("SYMB"), Some("TQQQ"));
}

#[tokio::test]
async fn when_domestic_client_buys_limit_snaps_to_exchange_tick() {
    // Given: A domestic client and a last price of 35,150
    let harness = Harness::new(
        ScriptedHttpClient::new()
            .with_token()
            .json(
                "/uapi/domestic-stock/v1/quotations/inquire-price",
                json!({"rt_cd": "0", "output": {"stck_prpr": "35150", "stck_oprc": "35000"}}),
            )
            .json("/uapi/domestic-stock/v1/trading/order-cash", order_accepted()),
    );
    let client = harness.domestic();
    let kodex = Symbol::parse(Market::Domestic, "069500").expect("symbol");

    // When: A market buy is placed
    let receipt = client.buy_market_order(&kodex, 1).await.expect("receipt");

    // Then: 35,150 * 1.01 is rounded up to the 50-won grid
    assert_eq!(receipt.limit_price, 35_550.0);
    let order = &harness.http.requests_to("/order-cash")[0];
    assert_eq!(order.headers.get("tr_id").map(String::as_str), Some("VTTC0802U"));
    assert_eq!(order.headers.get("custtype").map(String::as_str), Some("P"));
    assert_eq!(body_of(order)["ORD_UNPR"], "35550");
}

#[tokio::test]
async fn when_requests_exceed_budget_client_waits_on_shared_limiter() {
    // Given: A client whose limiter admits two calls per second
    let harness = Harness::new(
        ScriptedHttpClient::new()
            .with_token()
            .json(PRICE_PATH, price_payload("61.25")),
    );
    let client = KisClient::new(
        OverseasProfile::new(UsExchange::Nasdaq),
        Environment::Paper,
        credentials(),
        harness.http.clone(),
        harness.clock.clone(),
        harness.limiter(2),
    );

    // When: Three price calls are made back to back
    for _ in 0..3 {
        assert_eq!(client.current_price(&tqqq()).await.expect("price"), 61.25);
    }

    // Then: The third call waited a full period
    assert_eq!(harness.clock.sleeps(), vec![Duration::from_secs(1)]);
}

// =============================================================================
// Broker: Authentication
// =============================================================================

#[tokio::test]
async fn when_token_endpoint_throttles_client_waits_and_retries_once() {
    // Given: A token endpoint that answers 403 EGW00133 once, then succeeds
    let http = ScriptedHttpClient::new()
        .route(
            TOKEN_PATH,
            Ok(HttpResponse::new(
                403,
                r#"{"error_code":"EGW00133","error_description":"1분당 1회"}"#,
            )),
        )
        .with_token()
        .json(PRICE_PATH, price_payload("61.25"));
    let harness = Harness::new(http);
    let client = harness.overseas(Environment::Paper);

    // When: The client authenticates
    client.authenticate().await.expect("authenticated after retry");

    // Then: It slept 65 seconds between exactly two token requests
    assert_eq!(harness.clock.sleeps(), vec![Duration::from_secs(65)]);
    assert_eq!(harness.http.requests_to(TOKEN_PATH).len(), 2);

    // And: The cached token is reused by later calls
    client.current_price(&tqqq()).await.expect("price");
    assert_eq!(harness.http.requests_to(TOKEN_PATH).len(), 2);
}

#[tokio::test]
async fn when_token_endpoint_keeps_throttling_failure_is_fatal() {
    // Given: A token endpoint that always answers 403 EGW00133
    let harness = Harness::new(ScriptedHttpClient::new().route(
        TOKEN_PATH,
        Ok(HttpResponse::new(403, r#"{"error_code":"EGW00133"}"#)),
    ));
    let client = harness.overseas(Environment::Paper);

    // When: The client authenticates
    let error = client.authenticate().await.expect_err("should fail");

    // Then: One retry was made and the error aborts the session
    assert_eq!(harness.http.requests_to(TOKEN_PATH).len(), 2);
    assert_eq!(error.kind(), BrokerErrorKind::Auth);
    assert!(error.is_fatal());
}

#[tokio::test]
async fn when_credentials_are_rejected_every_call_fails_fatally() {
    // Given: A token endpoint that rejects the app key
    let harness = Harness::new(ScriptedHttpClient::new().route(
        TOKEN_PATH,
        Ok(HttpResponse::new(401, r#"{"error_code":"EGW00103"}"#)),
    ));
    let client = harness.overseas(Environment::Paper);

    // When: A price is requested
    let error = client.current_price(&tqqq()).await.expect_err("should fail");

    // Then: The failure is fatal and no quotation call was sent
    assert!(error.is_fatal());
    assert!(harness.http.requests_to(PRICE_PATH).is_empty());
}

#[tokio::test]
async fn when_token_expires_mid_session_next_call_issues_a_new_one() {
    // Given: A quotation call that reports an expired token once
    let http = ScriptedHttpClient::new()
        .with_token()
        .json(
            PRICE_PATH,
            json!({"rt_cd": "1", "msg_cd": "EGW00123", "msg1": "expired token"}),
        )
        .json(PRICE_PATH, price_payload("61.25"));
    let harness = Harness::new(http);
    let client = harness.overseas(Environment::Paper);

    // When: Two price calls are made
    let first = client.current_price(&tqqq()).await;
    let second = client.current_price(&tqqq()).await;

    // Then: The first fails, the second succeeds with a fresh token
    assert_eq!(
        first.expect_err("expired").business_code(),
        Some("1")
    );
    assert_eq!(second.expect("price"), 61.25);
    assert_eq!(harness.http.requests_to(TOKEN_PATH).len(), 2);
}

// =============================================================================
// Broker: Failure Classification
// =============================================================================

#[tokio::test]
async fn when_venue_reports_business_failure_result_is_non_fatal_error() {
    // Given: A quotation call answered with a non-zero result code
    let harness = Harness::new(
        ScriptedHttpClient::new()
            .with_token()
            .json(PRICE_PATH, json!({"rt_cd": "7", "msg_cd": "OPSQ0002", "msg1": "no data"})),
    );
    let client = harness.overseas(Environment::Paper);

    // When: The price is requested
    let error = client.current_price(&tqqq()).await.expect_err("should fail");

    // Then: The error is a business failure the session can skip
    assert_eq!(error.kind(), BrokerErrorKind::Business);
    assert!(!error.is_fatal());
}

#[tokio::test]
async fn when_transport_fails_result_is_retryable_transport_error() {
    // Given: A transport that cannot reach the quotation endpoint
    let harness = Harness::new(ScriptedHttpClient::new().with_token());
    let client = harness.overseas(Environment::Paper);

    // When: The price is requested
    let error = client.current_price(&tqqq()).await.expect_err("should fail");

    // Then: The error is a transport failure, not an auth failure
    assert_eq!(error.kind(), BrokerErrorKind::Transport);
    assert!(error.retryable());
    assert!(!error.is_fatal());
}

#[tokio::test]
async fn when_venue_rejects_order_receipt_reports_rejection() {
    // Given: An order endpoint that rejects the order
    let harness = Harness::new(
        ScriptedHttpClient::new()
            .with_token()
            .json(PRICE_PATH, price_payload("50.00"))
            .json(
                ORDER_PATH,
                json!({"rt_cd": "1", "msg_cd": "APBK0986", "msg1": "insufficient deposit"}),
            ),
    );
    let client = harness.overseas(Environment::Paper);

    // When: A buy is placed
    let receipt = client.buy_market_order(&tqqq(), 1).await.expect("receipt");

    // Then: The receipt carries the venue's verdict
    assert!(!receipt.is_success());
    assert_eq!(receipt.message_code.as_deref(), Some("APBK0986"));
}

// =============================================================================
// Broker: Payload Normalization
// =============================================================================

#[tokio::test]
async fn when_venue_sends_newest_bar_first_client_returns_oldest_first() {
    // Given: A daily-price payload in the venue's newest-first order
    let harness = Harness::new(ScriptedHttpClient::new().with_token().json(
        "/uapi/overseas-price/v1/quotations/dailyprice",
        json!({
            "rt_cd": "0",
            "output2": [
                {"xymd": "20240104", "open": "52", "high": "53", "low": "49", "clos": "50"},
                {"xymd": "20240103", "open": "50", "high": "51", "low": "48", "clos": "50.5"},
                {"xymd": "20240102", "open": "49", "high": "50", "low": "47", "clos": "49.5"}
            ]
        }),
    ));
    let client = harness.overseas(Environment::Paper);

    // When: Daily bars are requested
    let bars = client.daily_ohlc(&tqqq()).await.expect("bars");

    // Then: They come back oldest first, up to yesterday
    let dates: Vec<_> = bars.iter().map(|bar| bar.date).collect();
    assert_eq!(
        dates,
        vec![date!(2024 - 01 - 02), date!(2024 - 01 - 03), date!(2024 - 01 - 04)]
    );
    assert_eq!(bars[2].range(), 4.0);

    let request = &harness.http.requests_to("/dailyprice")[0];
    assert_eq!(request.query_param("BYMD"), Some("20240105"));
}

#[tokio::test]
async fn when_usd_entry_is_missing_foreign_balance_returns_raw_payload() {
    // Given: A present-balance payload without a USD entry
    let harness = Harness::new(ScriptedHttpClient::new().with_token().json(
        "/uapi/overseas-stock/v1/trading/inquire-present-balance",
        json!({"rt_cd": "0", "output2": [{"crcy_cd": "JPY", "frcr_dncl_amt_2": "1000"}]}),
    ));
    let client = harness.overseas(Environment::Paper);

    // When: The foreign balance is requested
    let balance = client.foreign_balance().await.expect("balance");

    // Then: The unrecognized sentinel carries the raw entries
    assert!(matches!(balance, ForeignBalance::Unrecognized { .. }));
    assert_eq!(balance.deposit(), None);
    let request = &harness.http.requests_to("/inquire-present-balance")[0];
    assert_eq!(request.headers.get("tr_id").map(String::as_str), Some("VTRP6504R"));
}

#[tokio::test]
async fn when_domestic_client_is_asked_for_foreign_balance_it_is_unsupported() {
    // Given: A domestic client
    let harness = Harness::new(ScriptedHttpClient::new().with_token());
    let client = harness.domestic();

    // When: The foreign balance is requested
    let error = client.foreign_balance().await.expect_err("unsupported");

    // Then: No request was sent and the error is not fatal
    assert_eq!(error.kind(), BrokerErrorKind::Unsupported);
    assert!(harness.http.requests().is_empty());
}
