//! Time source abstraction.
//!
//! Every delay in the crate (rate-limit waits, poll cadence, cooldowns, token
//! back-off) goes through [`Clock::sleep`], so tests drive whole sessions with
//! [`ManualClock`] without real sleeps.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use time::OffsetDateTime;

pub type Sleep<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

pub trait Clock: Send + Sync {
    /// Monotonic time elapsed since the clock's origin.
    fn monotonic(&self) -> Duration;

    /// Current wall-clock time in UTC.
    fn now_utc(&self) -> OffsetDateTime;

    fn sleep(&self, duration: Duration) -> Sleep<'_>;
}

/// Real clock backed by `Instant` and tokio timers.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }

    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn sleep(&self, duration: Duration) -> Sleep<'_> {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[derive(Debug)]
struct ManualState {
    elapsed: Duration,
    wall: OffsetDateTime,
    slept: Vec<Duration>,
}

/// Deterministic clock. Sleeping advances both monotonic and wall time
/// immediately and records the requested duration.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            state: Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                wall: start,
                slept: Vec::new(),
            }),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut state = self.lock();
        state.elapsed += duration;
        state.wall += duration;
    }

    /// Every duration passed to [`Clock::sleep`], in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().slept.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn monotonic(&self) -> Duration {
        self.lock().elapsed
    }

    fn now_utc(&self) -> OffsetDateTime {
        self.lock().wall
    }

    fn sleep(&self, duration: Duration) -> Sleep<'_> {
        {
            let mut state = self.lock();
            state.elapsed += duration;
            state.wall += duration;
            state.slept.push(duration);
        }
        Box::pin(std::future::ready(()))
    }
}
