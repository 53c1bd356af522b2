use std::collections::HashMap;
use std::sync::Arc;

use offerwatch::config::{ApiClassConfig, ThrottleConfig};
use offerwatch::throttle::{AdaptiveLimiter, TokenBucket};

fn limiter(min_delay_ms: u64, max_delay_ms: u64) -> AdaptiveLimiter {
    AdaptiveLimiter::new(ThrottleConfig {
        default: ApiClassConfig {
            min_delay_ms,
            max_delay_ms,
            retry_delay_ms: 1,
            daily_quota: 0,
        },
        classes: HashMap::new(),
    })
}

#[tokio::test]
async fn adaptive_delay_holds_its_bounds_through_any_feedback_sequence() {
    let limiter = limiter(50, 400);

    // A deterministic but adversarial mix: long throttle streaks broken by
    // bursts of successes.
    for step in 0..200u32 {
        if step % 7 < 5 {
            limiter.on_rate_limited("pricing").await;
        } else {
            limiter.on_success("pricing");
        }
        let delay = limiter.adaptive_delay_ms("pricing");
        assert!(
            (50..=400).contains(&delay),
            "step {step}: delay {delay} escaped [50, 400]"
        );
    }
}

#[tokio::test]
async fn bucket_conserves_tokens_under_concurrent_consumers() {
    let bucket = Arc::new(TokenBucket::new(20.0, 2.0));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let bucket = bucket.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..10 {
                bucket.consume(1.0).await;
                let available = bucket.available();
                assert!(
                    (0.0..=20.0).contains(&available),
                    "tokens {available} out of range"
                );
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!((0.0..=20.0).contains(&bucket.available()));
}

#[tokio::test]
async fn limiter_state_is_isolated_per_class() {
    let limiter = limiter(10, 1_000);

    for _ in 0..6 {
        limiter.on_rate_limited("pricing").await;
    }
    limiter.on_success("listings");

    assert!(limiter.adaptive_delay_ms("pricing") > 10);
    assert_eq!(limiter.adaptive_delay_ms("listings"), 10);
    assert_eq!(limiter.consecutive_failures("listings"), 0);
}

#[tokio::test]
async fn quota_counts_requests_per_class() {
    let limiter = limiter(1, 100);

    for _ in 0..3 {
        limiter.wait_for_slot("pricing").await;
    }
    limiter.wait_for_slot("listings").await;

    assert_eq!(limiter.quota_used("pricing"), 3);
    assert_eq!(limiter.quota_used("listings"), 1);
}

#[tokio::test]
async fn sequential_requests_are_spaced_by_the_adaptive_delay() {
    let limiter = limiter(20, 200);
    let start = tokio::time::Instant::now();

    for _ in 0..3 {
        limiter.wait_for_slot("pricing").await;
    }

    // Requests two and three each waited out the 20 ms spacing.
    assert!(start.elapsed() >= tokio::time::Duration::from_millis(40));
    assert_eq!(limiter.quota_used("pricing"), 3);
}
