//! Volatility-breakout calculations. Pure functions, no I/O.
//!
//! The session uses them in order: normalize the daily bars to oldest-first,
//! take the moving average of closes, gate on [`trend_filter`], then place the
//! entry threshold with [`breakout_target`] from today's open and the prior
//! bar's range.

use crate::domain::Bar;

/// Moving-average window used to decide whether a ticker is in an uptrend.
pub const TREND_WINDOW: usize = 20;

/// Default breakout aggressiveness.
pub const DEFAULT_K: f64 = 0.5;

/// Sort bars oldest-first regardless of delivery order.
pub fn chronological(mut bars: Vec<Bar>) -> Vec<Bar> {
    bars.sort_by_key(|bar| bar.date);
    bars
}

/// Mean of the most recent `window` closes, or `None` with fewer samples.
///
/// `closes` must already be oldest-first.
pub fn moving_average(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() < window {
        return None;
    }

    let recent = &closes[closes.len() - window..];
    Some(recent.iter().sum::<f64>() / window as f64)
}

/// Bullish when the price is strictly above the average. An undefined
/// average never passes.
pub fn trend_filter(current_price: f64, moving_average: Option<f64>) -> bool {
    moving_average.is_some_and(|ma| current_price > ma)
}

/// `today_open + k * (prior.high - prior.low)`, or `None` without a prior bar.
pub fn breakout_target(today_open: f64, prior_bar: Option<&Bar>, k: f64) -> Option<f64> {
    prior_bar.map(|bar| today_open + k * bar.range())
}

/// Most recent completed bar strictly before `today`, from oldest-first bars.
pub fn prior_session_bar(bars: &[Bar], today: time::Date) -> Option<&Bar> {
    bars.iter().rev().find(|bar| bar.date < today)
}
