//! Fixed daily trading windows.
//!
//! Windows are expressed in a single configured UTC offset (the operator's
//! local time). Daylight-saving shifts of foreign exchanges are not modeled.

use std::fmt::{Display, Formatter};

use time::macros::{offset, time};
use time::{OffsetDateTime, Time, UtcOffset};

use crate::domain::Market;
use crate::ValidationError;

/// Active session resolved from the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Session {
    Open(Market),
    Closed,
}

impl Session {
    pub const fn market(self) -> Option<Market> {
        match self {
            Self::Open(market) => Some(market),
            Self::Closed => None,
        }
    }
}

impl Display for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open(market) => write!(f, "{market} session"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// Half-open daily window `[opens, closes)`. A window whose close is earlier
/// than its open spans midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    pub market: Market,
    pub opens: Time,
    pub closes: Time,
}

impl SessionWindow {
    pub const fn new(market: Market, opens: Time, closes: Time) -> Self {
        Self {
            market,
            opens,
            closes,
        }
    }

    pub fn spans_midnight(&self) -> bool {
        self.closes < self.opens
    }

    pub fn contains(&self, local: Time) -> bool {
        if self.spans_midnight() {
            local >= self.opens || local < self.closes
        } else {
            local >= self.opens && local < self.closes
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketClock {
    offset: UtcOffset,
    windows: Vec<SessionWindow>,
}

impl MarketClock {
    pub fn new(offset: UtcOffset, windows: Vec<SessionWindow>) -> Self {
        Self { offset, windows }
    }

    pub const fn offset(&self) -> UtcOffset {
        self.offset
    }

    pub fn windows(&self) -> &[SessionWindow] {
        &self.windows
    }

    /// Session active at `instant`. The first matching window wins.
    pub fn session_at(&self, instant: OffsetDateTime) -> Session {
        self.session_at_local(instant.to_offset(self.offset).time())
    }

    pub fn session_at_local(&self, local: Time) -> Session {
        self.windows
            .iter()
            .find(|window| window.contains(local))
            .map_or(Session::Closed, |window| Session::Open(window.market))
    }
}

impl Default for MarketClock {
    /// Korean standard time: US regular hours 23:30–06:00, KRX 09:00–15:30.
    fn default() -> Self {
        Self::new(
            offset!(+9),
            vec![
                SessionWindow::new(Market::Overseas, time!(23:30), time!(06:00)),
                SessionWindow::new(Market::Domestic, time!(09:00), time!(15:30)),
            ],
        )
    }
}

/// Parse `HH:MM` into a time of day.
pub fn parse_time_of_day(value: &str) -> Result<Time, ValidationError> {
    let invalid = || ValidationError::InvalidTimeOfDay {
        value: value.to_owned(),
    };

    let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;
    if hour.len() != 2 || minute.len() != 2 {
        return Err(invalid());
    }
    let hour: u8 = hour.parse().map_err(|_| invalid())?;
    let minute: u8 = minute.parse().map_err(|_| invalid())?;
    Time::from_hms(hour, minute, 0).map_err(|_| invalid())
}
