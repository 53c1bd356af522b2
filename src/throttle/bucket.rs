//! Token bucket rate ceiling.

use std::time::Instant;

use parking_lot::Mutex;
use tokio::time::{sleep, Duration};
use tracing::trace;

use crate::config::BucketConfig;

/// Minimum sleep between availability checks while the bucket is empty.
const MIN_WAIT_MS: u64 = 50;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Strict long-run throughput ceiling with bounded bursts.
///
/// Tokens refill continuously at `refill_per_ms` up to `max_tokens`;
/// [`consume`](Self::consume) blocks until the requested cost is covered.
/// State is process-local and transient: pipeline correctness never depends
/// on it surviving a restart.
pub struct TokenBucket {
    state: Mutex<BucketState>,
    max_tokens: f64,
    refill_per_ms: f64,
}

impl TokenBucket {
    /// Create a bucket that starts full.
    #[must_use]
    pub fn new(max_tokens: f64, refill_per_ms: f64) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: max_tokens,
                last_refill: Instant::now(),
            }),
            max_tokens,
            refill_per_ms,
        }
    }

    #[must_use]
    pub fn from_config(config: &BucketConfig) -> Self {
        Self::new(config.max_tokens, config.refill_per_sec / 1_000.0)
    }

    /// Consume `cost` tokens, sleeping until the bucket can cover it.
    ///
    /// The wait is sized from the current deficit so an empty bucket sleeps
    /// roughly once instead of spinning, with a floor of 50 ms.
    pub async fn consume(&self, cost: f64) {
        loop {
            let wait_ms = {
                let mut state = self.state.lock();
                self.refill(&mut state);

                if state.tokens >= cost {
                    state.tokens -= cost;
                    return;
                }

                let deficit = cost - state.tokens;
                ((deficit / self.refill_per_ms).ceil() as u64).max(MIN_WAIT_MS)
            };

            trace!(wait_ms, "token bucket depleted, waiting");
            sleep(Duration::from_millis(wait_ms)).await;
        }
    }

    /// Tokens currently available, after refill.
    #[must_use]
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(state.last_refill).as_secs_f64() * 1_000.0;
        state.tokens = (state.tokens + elapsed_ms * self.refill_per_ms).min(self.max_tokens);
        state.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_full_and_deducts() {
        let bucket = TokenBucket::new(10.0, 1.0);
        bucket.consume(4.0).await;
        let available = bucket.available();
        assert!(available >= 6.0 && available <= 10.0);
    }

    #[tokio::test]
    async fn never_exceeds_max_tokens() {
        let bucket = TokenBucket::new(5.0, 100.0);
        // Plenty of refill time; the cap must hold.
        sleep(Duration::from_millis(20)).await;
        assert!(bucket.available() <= 5.0);
    }

    #[tokio::test]
    async fn never_goes_negative() {
        let bucket = TokenBucket::new(2.0, 0.1);
        bucket.consume(2.0).await;
        assert!(bucket.available() >= 0.0);
    }

    #[tokio::test]
    async fn blocks_until_refill_covers_cost() {
        let bucket = TokenBucket::new(1.0, 0.05); // 50 tokens/sec
        bucket.consume(1.0).await;

        let start = Instant::now();
        bucket.consume(1.0).await;
        // 1 token at 0.05 tokens/ms needs ~20ms, floored to the 50ms wait.
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn conservation_across_mixed_operations() {
        let bucket = TokenBucket::new(8.0, 0.5);
        for cost in [1.0, 3.0, 0.5, 2.5] {
            bucket.consume(cost).await;
            let available = bucket.available();
            assert!((0.0..=8.0).contains(&available), "tokens {available} out of range");
        }
    }
}
