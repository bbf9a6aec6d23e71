//! Error types shared across the core crate.
//!
//! [`ValidationError`] covers construction-time checks on domain values.
//! [`BrokerError`] is the single failure type returned by every broker
//! operation; callers match on [`BrokerErrorKind`] instead of null-checking.

use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::domain::Market;

/// Validation errors raised by domain constructors and configuration checks.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("{market} symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar {
        market: Market,
        ch: char,
        index: usize,
    },
    #[error("domestic symbol must be exactly 6 digits: '{value}'")]
    DomesticCodeLength { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("bar high must be >= low")]
    InvalidBarRange,

    #[error("breakout constant k must be in (0, 1]: {value}")]
    InvalidK { value: f64 },
    #[error("time of day must be HH:MM: '{value}'")]
    InvalidTimeOfDay { value: String },
    #[error("slippage must be within [0, 1): {value}")]
    InvalidSlippage { value: f64 },
    #[error("rate limit must allow at least one call per non-zero period")]
    InvalidRateLimit,
    #[error("order quantity must be greater than zero")]
    ZeroQuantity,
}

/// Broker-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerErrorKind {
    /// The request never produced a response (connect, timeout, body read).
    Transport,
    /// The venue answered with a non-success HTTP status.
    HttpStatus,
    /// The venue answered but the result code is not the success sentinel.
    Business,
    /// The payload could not be decoded into the expected shape.
    Malformed,
    /// Credentials were rejected or the token endpoint failed. Fatal for a session.
    Auth,
    /// The token endpoint is throttling this application key.
    AuthRateLimited,
    /// The operation does not exist for this market.
    Unsupported,
}

/// Structured broker error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerError {
    kind: BrokerErrorKind,
    message: String,
    business_code: Option<String>,
}

impl BrokerError {
    fn new(kind: BrokerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            business_code: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(BrokerErrorKind::Transport, message)
    }

    pub fn http_status(status: u16, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        Self::new(
            BrokerErrorKind::HttpStatus,
            format!("upstream returned status {status}: {snippet}"),
        )
    }

    pub fn business(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            kind: BrokerErrorKind::Business,
            message: format!("business failure ({code}): {}", message.into()),
            business_code: Some(code),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(BrokerErrorKind::Malformed, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(BrokerErrorKind::Auth, message)
    }

    pub fn auth_rate_limited(message: impl Into<String>) -> Self {
        Self::new(BrokerErrorKind::AuthRateLimited, message)
    }

    pub fn unsupported(market: Market, operation: &str) -> Self {
        Self::new(
            BrokerErrorKind::Unsupported,
            format!("operation '{operation}' is not available for the {market} market"),
        )
    }

    pub const fn kind(&self) -> BrokerErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Venue result code attached to business failures, when one was reported.
    pub fn business_code(&self) -> Option<&str> {
        self.business_code.as_deref()
    }

    /// Whether the calling session must abort.
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind, BrokerErrorKind::Auth)
    }

    pub const fn retryable(&self) -> bool {
        matches!(
            self.kind,
            BrokerErrorKind::Transport | BrokerErrorKind::HttpStatus | BrokerErrorKind::AuthRateLimited
        )
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            BrokerErrorKind::Transport => "broker.transport",
            BrokerErrorKind::HttpStatus => "broker.http_status",
            BrokerErrorKind::Business => "broker.business",
            BrokerErrorKind::Malformed => "broker.malformed",
            BrokerErrorKind::Auth => "broker.auth",
            BrokerErrorKind::AuthRateLimited => "broker.auth_rate_limited",
            BrokerErrorKind::Unsupported => "broker.unsupported",
        }
    }
}

impl Display for BrokerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for BrokerError {}
