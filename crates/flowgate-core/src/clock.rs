//! Time source for cache expiry and retry backoff.

use std::fmt::Debug;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

/// Source of "now" and of waiting
#[async_trait]
pub trait Clock: Send + Sync + Debug {
    /// Current instant
    fn now(&self) -> Instant;

    /// Wait for `duration`; dropping the future cancels the wait
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by tokio timers
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that only moves when told to.
///
/// `sleep` records the requested duration and advances the clock by it
/// without waiting, so backoff schedules can be asserted exactly.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock() += by;
    }

    /// Every duration passed to `sleep`, in call order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}
