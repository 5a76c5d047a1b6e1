//! Bounded retry with exponential backoff and jitter.

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use flowgate_monitoring::GatewayMetrics;

use crate::clock::Clock;
use crate::config::GatewayConfig;
use crate::error::GatewayResult;

/// Longest single wait between attempts, jitter included
pub const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(30);

/// Most retries a policy may be configured with
pub const MAX_RETRIES: u32 = 10;

/// Largest accepted growth factor between delays
pub const MAX_MULTIPLIER: f64 = 10.0;

/// Retry policy for transient upstream failures
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Relative jitter, 0.2 spreads each delay over ±20%
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(200),
            multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            multiplier: config.retry_multiplier,
            jitter_factor: config.retry_jitter,
        }
    }

    /// Delay before retry number `retry` (1-based), without jitter.
    ///
    /// Never exceeds [`MAX_BACKOFF_DELAY`].
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        scale_capped(self.base_delay, self.multiplier.powi(exponent))
    }

    /// Delay before retry number `retry` (1-based), with jitter applied
    pub fn delay_for(&self, retry: u32) -> Duration {
        let nominal = self.nominal_delay(retry);
        if !(self.jitter_factor > 0.0) {
            return nominal;
        }
        let spread = self.jitter_factor.min(1.0);
        let jitter = rand::thread_rng().gen_range(-spread..=spread);
        scale_capped(nominal, 1.0 + jitter)
    }
}

/// `delay * factor`, clamped to `[0, MAX_BACKOFF_DELAY]`; NaN scales to zero
fn scale_capped(delay: Duration, factor: f64) -> Duration {
    let secs = delay.as_secs_f64() * factor;
    if !(secs > 0.0) {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(secs.min(MAX_BACKOFF_DELAY.as_secs_f64()))
}

/// Run `call` until it succeeds, fails permanently, or the policy is spent.
///
/// Only transient errors are retried. The returned error carries the total
/// number of attempts made.
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    clock: &dyn Clock,
    operation: &str,
    mut call: F,
) -> GatewayResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = GatewayResult<T>>,
{
    let mut attempt: u32 = 1;
    loop {
        let started = Instant::now();
        let outcome = call().await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(value) => {
                GatewayMetrics::record_upstream_call(operation, attempt, "success", elapsed_ms);
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt <= policy.max_retries => {
                GatewayMetrics::record_upstream_call(operation, attempt, "retrying", elapsed_ms);
                let delay = policy.delay_for(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_retries + 1,
                    delay = ?delay,
                    error = %err,
                    "Transient upstream failure, retrying"
                );
                clock.sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                GatewayMetrics::record_upstream_call(operation, attempt, "failed", elapsed_ms);
                debug!(operation, attempt, error = %err, "Giving up on upstream call");
                return Err(err.with_attempts(attempt));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::GatewayError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn connection_error() -> GatewayError {
        GatewayError::Connection { attempts: 1, message: "refused".into() }
    }

    #[test]
    fn test_nominal_schedule_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.nominal_delay(1), Duration::from_millis(200));
        assert_eq!(policy.nominal_delay(2), Duration::from_millis(400));
        assert_eq!(policy.nominal_delay(3), Duration::from_millis(800));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..200 {
            let delay = policy.delay_for(2).as_secs_f64();
            assert!((0.32..=0.48).contains(&delay), "delay {} out of bounds", delay);
        }
    }

    #[test]
    fn test_delays_are_capped_for_extreme_policies() {
        let runaway = RetryPolicy {
            max_retries: u32::MAX,
            base_delay: Duration::from_millis(u64::MAX),
            multiplier: f64::INFINITY,
            jitter_factor: f64::INFINITY,
        };
        for retry in [1, 2, 64, u32::MAX] {
            assert_eq!(runaway.nominal_delay(retry), MAX_BACKOFF_DELAY);
            assert!(runaway.delay_for(retry) <= MAX_BACKOFF_DELAY);
        }

        let undefined = RetryPolicy {
            base_delay: Duration::ZERO,
            multiplier: f64::INFINITY,
            jitter_factor: f64::NAN,
            ..RetryPolicy::default()
        };
        assert_eq!(undefined.nominal_delay(3), Duration::ZERO);
        assert_eq!(undefined.delay_for(3), Duration::ZERO);

        let growing = RetryPolicy { jitter_factor: 0.0, ..RetryPolicy::default() };
        assert_eq!(growing.nominal_delay(8), Duration::from_millis(25_600));
        assert_eq!(growing.delay_for(9), MAX_BACKOFF_DELAY);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);

        let result = with_backoff(&RetryPolicy::default(), &clock, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(connection_error())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);

        let result: GatewayResult<()> = with_backoff(&RetryPolicy::default(), &clock, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GatewayError::Timeout { attempts: 1, message: "slow".into() }) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result, Err(GatewayError::Timeout { attempts: 3, message: "slow".into() }));
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);

        let result: GatewayResult<()> = with_backoff(&RetryPolicy::default(), &clock, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GatewayError::ClientRejected { status: 404, message: "missing".into() }) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_none_policy_makes_one_attempt() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);

        let result: GatewayResult<()> = with_backoff(&RetryPolicy::none(), &clock, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(connection_error()) }
        })
        .await;

        assert_eq!(result, Err(GatewayError::Connection { attempts: 1, message: "refused".into() }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
