use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::Date;

use crate::domain::Market;
use crate::ValidationError;

/// Result code the venue reports for a successful business outcome.
pub const SUCCESS_RESULT_CODE: &str = "0";

/// Daily OHLC bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: Date,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    pub fn new(
        date: Date,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("open", open)?;
        validate_non_negative("high", high)?;
        validate_non_negative("low", low)?;
        validate_non_negative("close", close)?;

        if high < low {
            return Err(ValidationError::InvalidBarRange);
        }

        Ok(Self {
            date,
            open,
            high,
            low,
            close,
        })
    }

    /// High minus low.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Current price snapshot. `open` is zero until the session's first trade prints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub last: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub previous_close: f64,
}

impl Quote {
    pub fn new(
        last: f64,
        open: f64,
        high: f64,
        low: f64,
        previous_close: f64,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("last", last)?;
        validate_non_negative("open", open)?;
        validate_non_negative("high", high)?;
        validate_non_negative("low", low)?;
        validate_non_negative("previous_close", previous_close)?;

        Ok(Self {
            last,
            open,
            high,
            low,
            previous_close,
        })
    }

    /// Whether the venue has reported an opening print yet.
    pub fn has_opened(&self) -> bool {
        self.open > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

/// Venue answer to an order submission.
///
/// A transport-level success says nothing about the trade: check
/// [`is_success`](Self::is_success) before treating the order as accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub side: OrderSide,
    pub limit_price: f64,
    pub result_code: Option<String>,
    pub message_code: Option<String>,
    pub message: Option<String>,
    pub order_number: Option<String>,
    pub raw: Value,
}

impl OrderReceipt {
    /// Build a receipt from the raw venue JSON.
    pub fn from_raw(side: OrderSide, limit_price: f64, raw: Value) -> Self {
        let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_owned);
        let order_number = raw
            .get("output")
            .and_then(|output| output.get("ODNO"))
            .and_then(Value::as_str)
            .map(str::to_owned);

        Self {
            side,
            limit_price,
            result_code: text("rt_cd"),
            message_code: text("msg_cd"),
            message: text("msg1"),
            order_number,
            raw,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result_code.as_deref().map(str::trim) == Some(SUCCESS_RESULT_CODE)
    }
}

/// Held position as reported by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub name: Option<String>,
    pub quantity: f64,
    pub average_price: Option<f64>,
    pub current_price: Option<f64>,
    pub profit_pct: Option<f64>,
}

/// Normalized account snapshot. Fields the venue did not report stay `None`
/// so presentation layers can render them as unavailable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub market: Market,
    pub cash: Option<f64>,
    pub total_evaluation: Option<f64>,
    pub positions: Vec<Position>,
}

/// Foreign-currency deposit. When the expected currency entry is absent the
/// raw payload is returned instead of an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ForeignBalance {
    Recognized {
        currency: String,
        deposit: f64,
        withdrawable: Option<f64>,
    },
    Unrecognized {
        raw: Value,
    },
}

impl ForeignBalance {
    pub fn deposit(&self) -> Option<f64> {
        match self {
            Self::Recognized { deposit, .. } => Some(*deposit),
            Self::Unrecognized { .. } => None,
        }
    }
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::date;

    #[test]
    fn rejects_inverted_bar() {
        let err = Bar::new(date!(2024 - 01 - 02), 10.0, 9.0, 11.0, 10.0).expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidBarRange));
    }

    #[test]
    fn rejects_nan_quote() {
        let err = Quote::new(f64::NAN, 0.0, 0.0, 0.0, 0.0).expect_err("must fail");
        assert!(matches!(err, ValidationError::NonFiniteValue { field: "last" }));
    }

    #[test]
    fn receipt_success_requires_result_code_sentinel() {
        let ok = OrderReceipt::from_raw(
            OrderSide::Buy,
            10.1,
            json!({"rt_cd": "0", "msg1": "accepted", "output": {"ODNO": "0000123"}}),
        );
        assert!(ok.is_success());
        assert_eq!(ok.order_number.as_deref(), Some("0000123"));

        let rejected = OrderReceipt::from_raw(OrderSide::Buy, 10.1, json!({"rt_cd": "1"}));
        assert!(!rejected.is_success());

        let missing = OrderReceipt::from_raw(OrderSide::Sell, 9.9, json!({}));
        assert!(!missing.is_success());
    }
}
