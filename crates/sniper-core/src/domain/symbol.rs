use std::fmt::{Display, Formatter};

use crate::domain::Market;
use crate::ValidationError;

const MAX_OVERSEAS_LEN: usize = 15;
const DOMESTIC_CODE_LEN: usize = 6;

/// Ticker symbol scoped to the market it trades in.
///
/// Overseas symbols are alphabetic tickers (`TQQQ`, `BRK.B`); domestic symbols
/// are six-character exchange codes (`069500`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    market: Market,
    code: String,
}

impl Symbol {
    /// Parse and normalize a symbol for `market`.
    pub fn parse(market: Market, input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let normalized = trimmed.to_ascii_uppercase();
        match market {
            Market::Overseas => validate_overseas(&normalized)?,
            Market::Domestic => validate_domestic(&normalized)?,
        }

        Ok(Self {
            market,
            code: normalized,
        })
    }

    pub const fn market(&self) -> Market {
        self.market
    }

    pub fn as_str(&self) -> &str {
        &self.code
    }
}

fn validate_overseas(symbol: &str) -> Result<(), ValidationError> {
    let len = symbol.chars().count();
    if len > MAX_OVERSEAS_LEN {
        return Err(ValidationError::SymbolTooLong {
            len,
            max: MAX_OVERSEAS_LEN,
        });
    }

    for (index, ch) in symbol.chars().enumerate() {
        let valid = if index == 0 {
            ch.is_ascii_alphabetic()
        } else {
            ch.is_ascii_alphanumeric() || ch == '.' || ch == '-'
        };
        if !valid {
            return Err(ValidationError::SymbolInvalidChar {
                market: Market::Overseas,
                ch,
                index,
            });
        }
    }
    Ok(())
}

fn validate_domestic(code: &str) -> Result<(), ValidationError> {
    if code.chars().count() != DOMESTIC_CODE_LEN {
        return Err(ValidationError::DomesticCodeLength {
            value: code.to_owned(),
        });
    }

    // Newer listings mix a letter into the code, so alphanumerics are accepted.
    if let Some((index, ch)) = code
        .chars()
        .enumerate()
        .find(|(_, ch)| !ch.is_ascii_alphanumeric())
    {
        return Err(ValidationError::SymbolInvalidChar {
            market: Market::Domestic,
            ch,
            index,
        });
    }
    Ok(())
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
