use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::Clock;
use crate::ValidationError;

/// Sliding-window request throttle.
///
/// At most `max_calls` requests are admitted within any trailing `period`.
/// The timestamp queue sits behind an async mutex held across the wait, so
/// concurrent callers sharing one limiter are admitted strictly one at a time.
pub struct RateLimiter {
    max_calls: usize,
    period: Duration,
    clock: Arc<dyn Clock>,
    window: Mutex<VecDeque<Duration>>,
}

impl RateLimiter {
    pub fn new(
        max_calls: usize,
        period: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ValidationError> {
        if max_calls == 0 || period.is_zero() {
            return Err(ValidationError::InvalidRateLimit);
        }

        Ok(Self {
            max_calls,
            period,
            clock,
            window: Mutex::new(VecDeque::with_capacity(max_calls)),
        })
    }

    pub const fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Waits until one more request fits in the window, then records it.
    pub async fn wait(&self) {
        let mut window = self.window.lock().await;

        let mut now = self.clock.monotonic();
        evict_expired(&mut window, now, self.period);

        while window.len() >= self.max_calls {
            let Some(&oldest) = window.front() else {
                break;
            };
            let remaining = self.period.saturating_sub(now.saturating_sub(oldest));
            if !remaining.is_zero() {
                debug!(wait_ms = remaining.as_millis() as u64, "rate limit reached, waiting");
                self.clock.sleep(remaining).await;
            }
            now = self.clock.monotonic();
            evict_expired(&mut window, now, self.period);
        }

        window.push_back(now);
    }

    /// Requests recorded within the trailing window.
    pub async fn in_flight(&self) -> usize {
        let mut window = self.window.lock().await;
        evict_expired(&mut window, self.clock.monotonic(), self.period);
        window.len()
    }
}

/// Entries exactly `period` old have left the trailing window.
fn evict_expired(window: &mut VecDeque<Duration>, now: Duration, period: Duration) {
    while window
        .front()
        .is_some_and(|&stamp| now.saturating_sub(stamp) >= period)
    {
        window.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use time::macros::datetime;

    fn limiter(max_calls: usize, period_ms: u64) -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::new(datetime!(2024-01-02 00:00 UTC)));
        let limiter = RateLimiter::new(max_calls, Duration::from_millis(period_ms), clock.clone())
            .expect("valid limiter");
        (clock, limiter)
    }

    #[test]
    fn rejects_empty_budget() {
        let clock = Arc::new(ManualClock::new(datetime!(2024-01-02 00:00 UTC)));
        assert!(RateLimiter::new(0, Duration::from_secs(1), clock.clone()).is_err());
        assert!(RateLimiter::new(5, Duration::ZERO, clock).is_err());
    }

    #[tokio::test]
    async fn waits_only_for_the_remaining_part_of_the_window() {
        let (clock, limiter) = limiter(2, 1_000);

        limiter.wait().await;
        clock.advance(Duration::from_millis(400));
        limiter.wait().await;
        limiter.wait().await;

        assert_eq!(clock.sleeps(), vec![Duration::from_millis(600)]);
        assert_eq!(clock.monotonic(), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn expired_entries_free_budget_without_sleeping() {
        let (clock, limiter) = limiter(3, 1_000);

        for _ in 0..3 {
            limiter.wait().await;
        }
        clock.advance(Duration::from_millis(1_000));
        limiter.wait().await;

        assert!(clock.sleeps().is_empty());
        assert_eq!(limiter.in_flight().await, 1);
    }
}
