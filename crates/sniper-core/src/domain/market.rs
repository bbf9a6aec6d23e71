use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::macros::offset;
use time::{Date, OffsetDateTime, UtcOffset};

const KST: UtcOffset = offset!(+9);

/// Trading market served by one broker client and one session window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    /// US-listed equities and ETFs.
    Overseas,
    /// Home-exchange equities and ETFs.
    Domestic,
}

impl Market {
    pub const ALL: [Market; 2] = [Market::Overseas, Market::Domestic];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Overseas => "overseas",
            Self::Domestic => "domestic",
        }
    }

    /// Offset under which the exchange's trading day never crosses midnight:
    /// UTC for US hours, KST for KRX hours.
    pub const fn exchange_offset(self) -> UtcOffset {
        match self {
            Self::Overseas => UtcOffset::UTC,
            Self::Domestic => KST,
        }
    }

    /// Trading date the venue assigns to bars at `instant`.
    pub fn trading_date(self, instant: OffsetDateTime) -> Date {
        instant.to_offset(self.exchange_offset()).date()
    }
}

impl Display for Market {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "overseas" | "us" => Ok(Self::Overseas),
            "domestic" | "kr" => Ok(Self::Domestic),
            other => Err(format!(
                "invalid market '{other}', expected one of overseas, domestic"
            )),
        }
    }
}

/// Brokerage account environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Paper,
    Live,
}

impl Environment {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::Live => "live",
        }
    }

    pub const fn is_paper(self) -> bool {
        matches!(self, Self::Paper)
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_market_aliases() {
        assert_eq!("US".parse::<Market>(), Ok(Market::Overseas));
        assert_eq!(" domestic ".parse::<Market>(), Ok(Market::Domestic));
        assert!("crypto".parse::<Market>().is_err());
    }

    #[test]
    fn krx_trading_date_follows_korean_calendar() {
        use time::macros::{date, datetime};

        let early_seoul_morning = datetime!(2024-01-04 23:30 UTC);

        assert_eq!(Market::Domestic.trading_date(early_seoul_morning), date!(2024 - 01 - 05));
        assert_eq!(Market::Overseas.trading_date(early_seoul_morning), date!(2024 - 01 - 04));
    }

    #[test]
    fn environment_defaults_to_paper() {
        assert!(Environment::default().is_paper());
    }
}
