//! Retry policies with fixed or exponential backoff.
//!
//! Two policies are used by the crate: the token endpoint's one-shot fixed
//! wait after a rate-limit rejection, and the streaming feed's reconnect loop.

use std::time::Duration;

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed {
        delay: Duration,
    },
    /// `base * factor^attempt`, capped at `max`, optionally jittered by +/- 50%.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped = Duration::from_secs_f64(seconds.min(max.as_secs_f64()));

                if !jitter {
                    return capped;
                }

                let capped_ms = u64::try_from(capped.as_millis()).unwrap_or(u64::MAX);
                let spread = capped_ms / 2;
                let offset = fastrand::u64(0..=spread.saturating_mul(2));
                Duration::from_millis(capped_ms.saturating_sub(spread).saturating_add(offset))
            }
        }
    }
}

/// Bounded retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts = `max_retries + 1`. `None` retries forever.
    pub max_retries: Option<u32>,
    pub backoff: Backoff,
}

impl RetryConfig {
    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries: Some(max_retries),
            backoff: Backoff::Fixed { delay },
        }
    }

    /// One retry after the venue's token throttle window (one token per minute).
    pub fn token_rate_limit() -> Self {
        Self::fixed(Duration::from_secs(65), 1)
    }

    /// Unbounded, jittered reconnects for long-lived feeds.
    pub fn stream_reconnect() -> Self {
        Self {
            max_retries: None,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(500),
                factor: 2.0,
                max: Duration::from_secs(30),
                jitter: true,
            },
        }
    }

    /// Delay before retry `attempt`, or `None` once the budget is spent.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self.max_retries {
            Some(max) if attempt >= max => None,
            _ => Some(self.backoff.delay(attempt)),
        }
    }
}
