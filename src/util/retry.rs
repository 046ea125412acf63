//! Retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{ClassifiedError, ErrorKind, Result};

/// Backoff curve between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Cap for the computed delay. A server-requested wait may exceed it.
    pub max: Duration,
    /// Growth factor per retry.
    pub multiplier: f64,
    /// Relative jitter; 0.25 spreads delays over 75%–125%.
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl Backoff {
    pub fn validate(&self) -> Result<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ClassifiedError::new(
                ErrorKind::ConfigurationError,
                format!("backoff multiplier must be at least 1, got {}", self.multiplier),
            ));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(ClassifiedError::new(
                ErrorKind::ConfigurationError,
                format!("backoff jitter must be in [0, 1), got {}", self.jitter),
            ));
        }
        Ok(())
    }
}

/// Retry policy for one call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::config::DEFAULT_MAX_RETRIES,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (0-based), never shorter than the
    /// server-requested `retry_after` seconds.
    pub fn delay_for(&self, retry: u32, retry_after: Option<f64>) -> Duration {
        let Backoff {
            initial,
            max,
            multiplier,
            jitter,
        } = self.backoff;

        let exp = multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let base = (initial.as_secs_f64() * exp).min(max.as_secs_f64());
        let factor = 1.0 - jitter + rand_factor() * 2.0 * jitter;
        let computed = seconds(base * factor);

        match retry_after.filter(|s| s.is_finite() && *s > 0.0) {
            Some(floor) => computed.max(seconds(floor)),
            None => computed,
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempts run out. The closure receives the 1-based attempt
    /// number. Cancellation interrupts both attempts and sleeps.
    pub async fn execute<F, Fut, T>(&self, cancel: &CancellationToken, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ClassifiedError::cancelled());
            }
            attempt += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClassifiedError::cancelled()),
                result = operation(attempt) => result,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !err.is_retryable() || attempt >= max_attempts {
                return Err(err);
            }

            let delay = self.delay_for(attempt - 1, err.retry_after_seconds());
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying after error"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClassifiedError::cancelled()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn seconds(secs: f64) -> Duration {
    let nanos = (secs.max(0.0) * 1e9).round();
    if nanos >= u64::MAX as f64 {
        Duration::MAX
    } else {
        Duration::from_nanos(nanos as u64)
    }
}

/// Simple pseudo-random factor [0, 1) without pulling in rand crate.
fn rand_factor() -> f64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    std::thread::current().id().hash(&mut hasher);

    let hash = hasher.finish();
    (hash % 10000) as f64 / 10000.0
}
