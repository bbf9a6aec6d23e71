//! LLM-backed sentiment gate using the Gemini `generateContent` endpoint.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::sentiment::news::{fetch_headline_digest, CNBC_FINANCE_FEED};
use crate::sentiment::{RiskLevel, SentimentFilter, SentimentFuture, SentimentVerdict};

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiSentiment {
    http: Arc<dyn HttpClient>,
    api_key: String,
    model: String,
    feed_url: String,
}

impl GeminiSentiment {
    pub fn new(http: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_owned(),
            feed_url: CNBC_FINANCE_FEED.to_owned(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_feed_url(mut self, feed_url: impl Into<String>) -> Self {
        self.feed_url = feed_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn ask(&self, digest: &str) -> Result<SentimentVerdict, String> {
        let url = format!("{API_BASE}/{}:generateContent", self.model);
        let body = json!({
            "contents": [{ "parts": [{ "text": build_prompt(digest) }] }]
        });
        let request = HttpRequest::post(url)
            .with_auth(&HttpAuth::Header {
                name: String::from("x-goog-api-key"),
                value: self.api_key.clone(),
            })
            .with_json(&body)
            .with_timeout_ms(30_000);

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|error| format!("model request failed: {}", error.message()))?;
        if !response.is_success() {
            return Err(format!("model returned status {}", response.status));
        }

        let payload: Value = serde_json::from_str(&response.body)
            .map_err(|error| format!("model response is not JSON: {error}"))?;
        let text = payload
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .ok_or_else(|| String::from("model response has no text candidate"))?;

        parse_verdict(text)
    }
}

impl SentimentFilter for GeminiSentiment {
    fn headline_digest(&self) -> SentimentFuture<'_, String> {
        Box::pin(fetch_headline_digest(self.http.as_ref(), &self.feed_url))
    }

    fn assess<'a>(&'a self, digest: &'a str) -> SentimentFuture<'a, SentimentVerdict> {
        Box::pin(async move {
            if digest.trim().is_empty() {
                return SentimentVerdict::approve("no news found; skipping model check");
            }

            match self.ask(digest).await {
                Ok(verdict) => {
                    info!(
                        risk = %verdict.risk_level,
                        can_buy = verdict.can_buy,
                        reason = %verdict.reason,
                        "sentiment verdict"
                    );
                    verdict
                }
                Err(reason) => {
                    warn!(%reason, "sentiment check failed; blocking buys");
                    SentimentVerdict::unknown(format!("model error: {reason}"))
                }
            }
        })
    }
}

fn build_prompt(digest: &str) -> String {
    format!(
        "Act as an aggressive stock trader.\n\
         Here are the latest news headlines regarding the US tech market and the Fed:\n\
         {digest}\n\n\
         Critical check:\n\
         1. Is there any MAJOR crash signal (war, unexpected rate hike)?\n\
         2. Is the sentiment predominantly fear?\n\n\
         Reply with JSON ONLY:\n\
         {{\"risk_level\": \"HIGH\" or \"LOW\", \"can_buy\": boolean, \"reason\": \"short summary\"}}"
    )
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    risk_level: String,
    can_buy: bool,
    #[serde(default)]
    reason: String,
}

/// Parse the model's JSON answer, tolerating a markdown code fence.
pub fn parse_verdict(text: &str) -> Result<SentimentVerdict, String> {
    let raw: RawVerdict = serde_json::from_str(strip_code_fence(text))
        .map_err(|error| format!("model answer is not a verdict: {error}"))?;
    let risk_level = raw.risk_level.parse().unwrap_or(RiskLevel::Unknown);

    Ok(SentimentVerdict {
        risk_level,
        can_buy: raw.can_buy,
        reason: raw.reason,
    })
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}
