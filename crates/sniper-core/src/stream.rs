//! Real-time price feed over the venue's websocket channel.
//!
//! Data frames look like `flag|tr_id|count|payload`, where `payload` holds
//! `count` records of `^`-separated positional fields. JSON frames on the
//! same channel are control messages (subscription acks, keep-alive pings).
//! Field positions are not pinned down by the venue, so [`FeedLayout`]
//! carries them as configuration.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::broker::{Credentials, UsExchange};
use crate::clock::Clock;
use crate::domain::{Environment, Market, Symbol};
use crate::http_client::{HttpClient, HttpRequest};
use crate::retry::RetryConfig;

pub const LIVE_WS_URL: &str = "ws://ops.koreainvestment.com:21000";
pub const PAPER_WS_URL: &str = "ws://ops.koreainvestment.com:31000";

const APPROVAL_PATH: &str = "/oauth2/Approval";
const PINGPONG: &str = "PINGPONG";

pub const fn ws_url(environment: Environment) -> &'static str {
    match environment {
        Environment::Live => LIVE_WS_URL,
        Environment::Paper => PAPER_WS_URL,
    }
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("approval key request failed: {0}")]
    Approval(String),
    #[error("websocket connect failed: {0}")]
    Connect(String),
    #[error("websocket transport error: {0}")]
    Transport(String),
    #[error("malformed feed frame: {0}")]
    MalformedFrame(String),
    #[error("gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

/// Transaction id and field offsets for one market's execution feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedLayout {
    pub tr_id: String,
    pub symbol_field: usize,
    pub price_field: usize,
}

impl FeedLayout {
    pub fn overseas() -> Self {
        Self {
            tr_id: String::from("HDFSCNT0"),
            symbol_field: 1,
            price_field: 11,
        }
    }

    pub fn domestic() -> Self {
        Self {
            tr_id: String::from("H0STCNT0"),
            symbol_field: 0,
            price_field: 2,
        }
    }

    pub fn for_market(market: Market) -> Self {
        match market {
            Market::Overseas => Self::overseas(),
            Market::Domestic => Self::domestic(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedFrame {
    Data {
        encrypted: bool,
        tr_id: String,
        records: Vec<Vec<String>>,
    },
    Control(Value),
}

impl FeedFrame {
    /// Keep-alive frames must be echoed back verbatim.
    pub fn is_pingpong(&self) -> bool {
        match self {
            Self::Control(value) => {
                value.pointer("/header/tr_id").and_then(Value::as_str) == Some(PINGPONG)
            }
            Self::Data { .. } => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceTick {
    pub symbol: String,
    pub price: f64,
}

pub fn parse_frame(raw: &str) -> Result<FeedFrame, StreamError> {
    let raw = raw.trim();
    if raw.starts_with('{') {
        return serde_json::from_str(raw)
            .map(FeedFrame::Control)
            .map_err(|error| StreamError::MalformedFrame(format!("control frame: {error}")));
    }

    let mut parts = raw.splitn(4, '|');
    let (Some(flag), Some(tr_id), Some(count), Some(payload)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(StreamError::MalformedFrame(format!(
            "expected 4 '|' sections: {}",
            preview(raw)
        )));
    };

    let count: usize = count
        .trim()
        .parse()
        .map_err(|_| StreamError::MalformedFrame(format!("record count '{count}'")))?;
    let fields: Vec<String> = payload.split('^').map(str::to_owned).collect();
    if count == 0 || fields.len() % count != 0 {
        return Err(StreamError::MalformedFrame(format!(
            "{} fields cannot hold {count} records",
            fields.len()
        )));
    }

    let width = fields.len() / count;
    let records = fields.chunks(width).map(<[String]>::to_vec).collect();

    Ok(FeedFrame::Data {
        encrypted: flag.trim() == "1",
        tr_id: tr_id.to_owned(),
        records,
    })
}

/// Price ticks carried by a plaintext data frame for `layout`'s feed.
pub fn extract_ticks(frame: &FeedFrame, layout: &FeedLayout) -> Vec<PriceTick> {
    let FeedFrame::Data {
        encrypted: false,
        tr_id,
        records,
    } = frame
    else {
        return Vec::new();
    };
    if *tr_id != layout.tr_id {
        return Vec::new();
    }

    records
        .iter()
        .filter_map(|record| {
            let symbol = record.get(layout.symbol_field)?.trim();
            let price: f64 = record.get(layout.price_field)?.trim().parse().ok()?;
            (!symbol.is_empty() && price.is_finite() && price > 0.0).then(|| PriceTick {
                symbol: symbol.to_owned(),
                price,
            })
        })
        .collect()
}

/// Subscription key for a symbol: `D{EXCD}{SYMBOL}` overseas, the code domestic.
pub fn subscription_key(symbol: &Symbol, exchange: UsExchange) -> String {
    match symbol.market() {
        Market::Overseas => format!("D{}{}", exchange.quote_code(), symbol.as_str()),
        Market::Domestic => symbol.as_str().to_owned(),
    }
}

pub fn subscribe_message(approval_key: &str, tr_id: &str, tr_key: &str) -> Value {
    json!({
        "header": {
            "approval_key": approval_key,
            "custtype": "P",
            "tr_type": "1",
            "content-type": "utf-8",
        },
        "body": {
            "input": {
                "tr_id": tr_id,
                "tr_key": tr_key,
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct ApprovalPayload {
    approval_key: String,
}

/// Exchange app credentials for a websocket approval key.
pub async fn request_approval_key(
    http: &dyn HttpClient,
    base_url: &str,
    credentials: &Credentials,
) -> Result<String, StreamError> {
    let body = json!({
        "grant_type": "client_credentials",
        "appkey": credentials.app_key,
        "secretkey": credentials.app_secret,
    });
    let request = HttpRequest::post(format!("{base_url}{APPROVAL_PATH}")).with_json(&body);

    let response = http
        .execute(request)
        .await
        .map_err(|error| StreamError::Approval(error.message().to_owned()))?;
    if !response.is_success() {
        return Err(StreamError::Approval(format!("status {}", response.status)));
    }

    let payload: ApprovalPayload = serde_json::from_str(&response.body)
        .map_err(|error| StreamError::Approval(format!("malformed payload: {error}")))?;
    info!("websocket approval key issued");
    Ok(payload.approval_key)
}

enum Disconnect {
    ReceiverDropped,
    Remote { delivered: bool },
}

/// Websocket consumer that keeps one set of subscriptions alive and forwards
/// price ticks to a channel until the receiver is dropped.
pub struct PriceFeed {
    url: String,
    approval_key: String,
    layout: FeedLayout,
    keys: Vec<String>,
    retry: RetryConfig,
    clock: Arc<dyn Clock>,
}

impl PriceFeed {
    pub fn new(
        url: impl Into<String>,
        approval_key: impl Into<String>,
        layout: FeedLayout,
        keys: Vec<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            url: url.into(),
            approval_key: approval_key.into(),
            layout,
            keys,
            retry: RetryConfig::stream_reconnect(),
            clock,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Run the feed on a background task.
    pub fn spawn(
        self,
        buffer: usize,
    ) -> (
        mpsc::Receiver<PriceTick>,
        tokio::task::JoinHandle<Result<(), StreamError>>,
    ) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let handle = tokio::spawn(self.run(sender));
        (receiver, handle)
    }

    /// Connect, subscribe and forward ticks; reconnects with backoff.
    pub async fn run(self, sender: mpsc::Sender<PriceTick>) -> Result<(), StreamError> {
        let mut attempt = 0_u32;
        loop {
            match self.connect_once(&sender).await {
                Ok(Disconnect::ReceiverDropped) => return Ok(()),
                Ok(Disconnect::Remote { delivered }) => {
                    if delivered {
                        attempt = 0;
                    }
                    warn!(url = %self.url, "price feed closed by remote");
                }
                Err(error) => warn!(%error, url = %self.url, "price feed failed"),
            }

            if sender.is_closed() {
                return Ok(());
            }
            let Some(delay) = self.retry.delay_for_attempt(attempt) else {
                return Err(StreamError::ReconnectExhausted { attempts: attempt });
            };
            debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting price feed");
            self.clock.sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
    }

    async fn connect_once(
        &self,
        sender: &mpsc::Sender<PriceTick>,
    ) -> Result<Disconnect, StreamError> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|error| StreamError::Connect(error.to_string()))?;
        let (mut write, mut read) = socket.split();
        info!(url = %self.url, subscriptions = self.keys.len(), "price feed connected");

        for key in &self.keys {
            let message = subscribe_message(&self.approval_key, &self.layout.tr_id, key);
            write
                .send(Message::Text(message.to_string()))
                .await
                .map_err(|error| StreamError::Transport(error.to_string()))?;
            debug!(tr_key = %key, "subscribed");
        }

        let mut delivered = false;
        while let Some(message) = read.next().await {
            let message = message.map_err(|error| StreamError::Transport(error.to_string()))?;
            match message {
                Message::Text(text) => {
                    let frame = match parse_frame(&text) {
                        Ok(frame) => frame,
                        Err(error) => {
                            debug!(%error, "skipping frame");
                            continue;
                        }
                    };
                    if frame.is_pingpong() {
                        write
                            .send(Message::Text(text))
                            .await
                            .map_err(|error| StreamError::Transport(error.to_string()))?;
                        continue;
                    }
                    if let FeedFrame::Control(control) = &frame {
                        debug!(%control, "control frame");
                        continue;
                    }
                    for tick in extract_ticks(&frame, &self.layout) {
                        if sender.send(tick).await.is_err() {
                            return Ok(Disconnect::ReceiverDropped);
                        }
                        delivered = true;
                    }
                }
                Message::Ping(payload) => {
                    write
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|error| StreamError::Transport(error.to_string()))?;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        Ok(Disconnect::Remote { delivered })
    }
}

fn preview(raw: &str) -> String {
    raw.chars().take(80).collect()
}
