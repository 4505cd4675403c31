//! Exponential backoff with jitter for collaborator calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::constants::{
    DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_JITTER, DEFAULT_RETRY_MAX_ATTEMPTS,
    DEFAULT_RETRY_MAX_DELAY_MS, MAX_RETRY_ATTEMPTS,
};
use crate::error::{CalSyncError, CalSyncResult};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
            jitter_factor: DEFAULT_RETRY_JITTER,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> CalSyncResult<Self> {
        if !(1..=MAX_RETRY_ATTEMPTS).contains(&max_attempts) {
            return Err(CalSyncError::Config(format!(
                "retry.max_attempts must be between 1 and {}, got {}",
                MAX_RETRY_ATTEMPTS, max_attempts
            )));
        }
        if base_delay > max_delay {
            return Err(CalSyncError::Config(format!(
                "retry.base_delay ({:?}) cannot be greater than retry.max_delay ({:?})",
                base_delay, max_delay
            )));
        }
        Ok(RetryPolicy {
            max_attempts,
            base_delay,
            max_delay,
            jitter_factor: DEFAULT_RETRY_JITTER,
        })
    }

    /// A single attempt, no waiting.
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_factor: 0.0,
        }
    }

    pub fn with_jitter_factor(mut self, factor: f64) -> CalSyncResult<Self> {
        if !(0.0..=1.0).contains(&factor) {
            return Err(CalSyncError::Config(format!(
                "retry.jitter must be between 0.0 and 1.0, got {}",
                factor
            )));
        }
        self.jitter_factor = factor;
        Ok(self)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before retry number `attempt` (0-based), jitter included.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.apply_jitter(self.backoff(attempt))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base_millis = self.base_delay.as_millis() as u64;
        let max_millis = self.max_delay.as_millis() as u64;
        let multiplier = 2_u64.saturating_pow(attempt);
        Duration::from_millis(base_millis.saturating_mul(multiplier).min(max_millis))
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_factor == 0.0 || delay.is_zero() {
            return delay;
        }

        let delay_millis = delay.as_millis() as f64;
        let jitter_range = delay_millis * self.jitter_factor;
        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        Duration::from_millis((delay_millis + jitter).max(0.0) as u64)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Only errors for which [`CalSyncError::is_transient`] holds are retried.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> CalSyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CalSyncResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation = label, attempt = attempt + 1, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = label,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after transient error: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO, Duration::ZERO)
            .unwrap()
            .with_jitter_factor(0.0)
            .unwrap()
    }

    #[test]
    fn test_attempt_bounds_are_validated() {
        assert!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).is_err());
        assert!(RetryPolicy::new(11, Duration::ZERO, Duration::ZERO).is_err());
        assert!(RetryPolicy::new(10, Duration::ZERO, Duration::ZERO).is_ok());
    }

    #[test]
    fn test_base_above_max_is_rejected() {
        let err = RetryPolicy::new(3, Duration::from_secs(5), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, CalSyncError::Config(_)));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(500))
            .unwrap()
            .with_jitter_factor(0.0)
            .unwrap();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for(40), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000), Duration::from_millis(1000))
            .unwrap()
            .with_jitter_factor(0.2)
            .unwrap();
        for _ in 0..50 {
            let ms = policy.delay_for(0).as_millis();
            assert!((800..=1200).contains(&ms), "delay {ms}ms out of range");
        }
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = fast(4)
            .run("flaky", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CalSyncError::Api {
                        status: 503,
                        message: "unavailable".into(),
                    })
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: CalSyncResult<()> = fast(4)
            .run("forbidden", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(CalSyncError::Api {
                    status: 403,
                    message: "forbidden".into(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_last_error_is_returned_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: CalSyncResult<()> = fast(3)
            .run("down", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(CalSyncError::Transport("connection reset".into()))
            })
            .await;

        assert!(matches!(result, Err(CalSyncError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
