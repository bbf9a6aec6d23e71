//! News-sentiment gate consulted on every breakout.
//!
//! Filters never return errors: anything that goes wrong is folded into a
//! verdict with `can_buy = false`.

pub mod gemini;
pub mod news;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use gemini::GeminiSentiment;
pub use news::{fetch_headline_digest, parse_headlines, Headline, CNBC_FINANCE_FEED};

pub type SentimentFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    High,
    Unknown,
}

impl RiskLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::High => "HIGH",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl Display for RiskLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = std::convert::Infallible;

    /// Anything other than LOW or HIGH reads as UNKNOWN.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.trim().to_ascii_uppercase().as_str() {
            "LOW" => Self::Low,
            "HIGH" => Self::High,
            _ => Self::Unknown,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentVerdict {
    pub risk_level: RiskLevel,
    pub can_buy: bool,
    pub reason: String,
}

impl SentimentVerdict {
    pub fn approve(reason: impl Into<String>) -> Self {
        Self {
            risk_level: RiskLevel::Low,
            can_buy: true,
            reason: reason.into(),
        }
    }

    pub fn reject(risk_level: RiskLevel, reason: impl Into<String>) -> Self {
        Self {
            risk_level,
            can_buy: false,
            reason: reason.into(),
        }
    }

    /// Fail-closed verdict for errors and unparseable answers.
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self::reject(RiskLevel::Unknown, reason)
    }
}

pub trait SentimentFilter: Send + Sync {
    /// Free-text digest of current headlines. Empty when nothing was fetched.
    fn headline_digest(&self) -> SentimentFuture<'_, String>;

    fn assess<'a>(&'a self, digest: &'a str) -> SentimentFuture<'a, SentimentVerdict>;

    /// Fetch a fresh digest and assess it.
    fn evaluate(&self) -> SentimentFuture<'_, SentimentVerdict> {
        Box::pin(async move {
            let digest = self.headline_digest().await;
            self.assess(&digest).await
        })
    }
}

/// Gate that always answers with the same verdict. Used when no model is
/// configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticSentiment {
    verdict: SentimentVerdict,
}

impl StaticSentiment {
    pub fn new(verdict: SentimentVerdict) -> Self {
        Self { verdict }
    }

    pub fn approve() -> Self {
        Self::new(SentimentVerdict::approve("sentiment gate disabled"))
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self::new(SentimentVerdict::reject(RiskLevel::High, reason))
    }
}

impl SentimentFilter for StaticSentiment {
    fn headline_digest(&self) -> SentimentFuture<'_, String> {
        Box::pin(async { String::new() })
    }

    fn assess<'a>(&'a self, _digest: &'a str) -> SentimentFuture<'a, SentimentVerdict> {
        Box::pin(async move { self.verdict.clone() })
    }
}
