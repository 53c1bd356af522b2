//! Reusable per-item retry policy with exponential backoff and jitter.

use std::future::Future;

use rand::Rng;
use tokio::time::{sleep, Duration};
use tracing::debug;

use crate::config::BatchConfig;
use crate::error::{Error, Result};

/// Extra backoff factor applied to throttle responses.
const RATE_LIMIT_MULTIPLIER: u64 = 4;

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Throttled by the remote API; retried with a longer backoff.
    RateLimited,
    /// Transient failure; retried with the standard backoff.
    Transient,
    /// Not worth retrying; the attempt loop breaks immediately.
    Fatal,
}

/// Classify an error for retry purposes.
///
/// Only an explicit throttle signal maps to [`ErrorClass::RateLimited`];
/// malformed input and configuration problems never improve with retries.
#[must_use]
pub fn classify(error: &Error) -> ErrorClass {
    match error {
        Error::RateLimited(_) => ErrorClass::RateLimited,
        Error::Parse(_) | Error::Json(_) | Error::Config(_) | Error::Url(_) => ErrorClass::Fatal,
        _ => ErrorClass::Transient,
    }
}

/// Result of running an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { error: Error, attempts: u32 },
}

/// One retry policy shared by every path that re-attempts work.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// Backoff before the attempt after `attempt` (1-based) failed.
    ///
    /// Doubles per attempt, with throttle responses waiting
    /// [`RATE_LIMIT_MULTIPLIER`] times longer, capped at `max_delay`, plus
    /// up to 20% jitter so parallel workers do not retry in lockstep.
    #[must_use]
    pub fn backoff(&self, attempt: u32, class: ErrorClass) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let mut millis = (self.base_delay.as_millis() as u64).saturating_mul(1 << exponent);
        if class == ErrorClass::RateLimited {
            millis = millis.saturating_mul(RATE_LIMIT_MULTIPLIER);
        }
        millis = millis.min(self.max_delay.as_millis() as u64);

        let jitter = if millis == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=millis / 5)
        };
        Duration::from_millis(millis + jitter)
    }

    /// Run `op` until it succeeds, exhausts `max_attempts`, or fails
    /// fatally. `on_error` observes every failed attempt (the batch runner
    /// uses it to feed throttle signals back to the adaptive limiter).
    pub async fn run<T, F, Fut, H, HFut>(&self, mut op: F, mut on_error: H) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        H: FnMut(ErrorClass) -> HFut,
        HFut: Future<Output = ()>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match op().await {
                Ok(value) => return RetryOutcome::Succeeded { value, attempts },
                Err(error) => {
                    let class = classify(&error);
                    debug!(attempt = attempts, class = ?class, error = %error, "attempt failed");
                    on_error(class).await;

                    if class == ErrorClass::Fatal || attempts >= self.max_attempts {
                        return RetryOutcome::Exhausted { error, attempts };
                    }
                    sleep(self.backoff(attempts, class)).await;
                }
            }
        }
    }
}
