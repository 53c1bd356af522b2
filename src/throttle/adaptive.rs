//! Feedback-controlled request spacing per API class.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{ApiClassConfig, ThrottleConfig};

/// Consecutive throttle responses tolerated before the spacing grows.
const GROWTH_THRESHOLD: u32 = 2;
/// Multiplier applied to the adaptive delay once growth kicks in.
const GROWTH_FACTOR: f64 = 1.5;
/// Fraction of the adaptive delay shed on each successful request.
const DECAY_FACTOR: f64 = 0.9;

struct ClassState {
    adaptive_delay_ms: u64,
    consecutive_failures: u32,
    last_request: Option<Instant>,
    daily_quota_count: u64,
    quota_resets_at: DateTime<Utc>,
}

impl ClassState {
    fn new(config: &ApiClassConfig) -> Self {
        Self {
            adaptive_delay_ms: config.min_delay_ms,
            consecutive_failures: 0,
            last_request: None,
            daily_quota_count: 0,
            quota_resets_at: next_utc_midnight(Utc::now()),
        }
    }

    fn roll_quota(&mut self, now: DateTime<Utc>) {
        if now >= self.quota_resets_at {
            debug!(previous = self.daily_quota_count, "daily quota rolled over");
            self.daily_quota_count = 0;
            self.quota_resets_at = next_utc_midnight(now);
        }
    }
}

fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = (now + ChronoDuration::days(1)).date_naive();
    DateTime::from_naive_utc_and_offset(
        tomorrow.and_hms_opt(0, 0, 0).unwrap_or_default(),
        Utc,
    )
}

/// Per-class minimum spacing between outbound requests.
///
/// The spacing is a heuristic, not a hard ceiling: it grows by 1.5x after
/// more than two consecutive throttle responses (capped at the class
/// maximum) and decays 10% toward the class minimum on every success. The
/// invariant `min_delay <= adaptive_delay <= max_delay` holds through any
/// sequence of feedback calls. Pair with a [`TokenBucket`](super::TokenBucket)
/// when a strict ceiling is required.
pub struct AdaptiveLimiter {
    config: ThrottleConfig,
    classes: DashMap<String, Mutex<ClassState>>,
}

impl AdaptiveLimiter {
    #[must_use]
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            classes: DashMap::new(),
        }
    }

    /// Sleep out the remainder of the adaptive delay since the last request
    /// for this class, then stamp the request and count it against the
    /// daily quota.
    pub async fn wait_for_slot(&self, class: &str) {
        let wait = {
            let entry = self.entry(class);
            let mut state = entry.lock();
            state.roll_quota(Utc::now());
            let delay = Duration::from_millis(state.adaptive_delay_ms);
            match state.last_request {
                Some(last) => delay.saturating_sub(last.elapsed()),
                None => Duration::ZERO,
            }
        };

        if !wait.is_zero() {
            debug!(class, wait_ms = wait.as_millis() as u64, "throttle spacing");
            sleep(wait).await;
        }

        let entry = self.entry(class);
        let mut state = entry.lock();
        state.last_request = Some(Instant::now());
        state.daily_quota_count += 1;

        let quota = self.config.class(class).daily_quota;
        if quota > 0 && state.daily_quota_count > quota {
            warn!(
                class,
                used = state.daily_quota_count,
                quota,
                "daily request quota exceeded"
            );
        }
    }

    /// Record a throttle response.
    ///
    /// Isolated throttles just sleep the fixed retry delay; more than
    /// [`GROWTH_THRESHOLD`] consecutive ones grow the spacing instead.
    pub async fn on_rate_limited(&self, class: &str) {
        let (retry_sleep_ms, grown_to) = {
            let max_delay_ms = self.config.class(class).max_delay_ms;
            let retry_delay_ms = self.config.class(class).retry_delay_ms;
            let entry = self.entry(class);
            let mut state = entry.lock();
            state.consecutive_failures += 1;

            if state.consecutive_failures > GROWTH_THRESHOLD {
                let grown = (state.adaptive_delay_ms as f64 * GROWTH_FACTOR) as u64;
                state.adaptive_delay_ms = grown.min(max_delay_ms);
                (0, Some(state.adaptive_delay_ms))
            } else {
                (retry_delay_ms, None)
            }
        };

        if let Some(delay_ms) = grown_to {
            info!(class, adaptive_delay_ms = delay_ms, "throttle spacing grown");
        }
        if retry_sleep_ms > 0 {
            warn!(class, retry_sleep_ms, "rate limited, backing off");
            sleep(Duration::from_millis(retry_sleep_ms)).await;
        }
    }

    /// Record a successful request: reset the throttle streak and decay the
    /// spacing toward the class minimum.
    pub fn on_success(&self, class: &str) {
        let min_delay_ms = self.config.class(class).min_delay_ms;
        let entry = self.entry(class);
        let mut state = entry.lock();
        state.consecutive_failures = 0;
        state.adaptive_delay_ms =
            ((state.adaptive_delay_ms as f64 * DECAY_FACTOR) as u64).max(min_delay_ms);
    }

    /// Current adaptive delay for a class, in milliseconds.
    #[must_use]
    pub fn adaptive_delay_ms(&self, class: &str) -> u64 {
        self.entry(class).lock().adaptive_delay_ms
    }

    /// Consecutive throttle responses recorded for a class.
    #[must_use]
    pub fn consecutive_failures(&self, class: &str) -> u32 {
        self.entry(class).lock().consecutive_failures
    }

    /// Requests counted against the class quota since the last UTC midnight.
    #[must_use]
    pub fn quota_used(&self, class: &str) -> u64 {
        self.entry(class).lock().daily_quota_count
    }

    fn entry(
        &self,
        class: &str,
    ) -> dashmap::mapref::one::Ref<'_, String, Mutex<ClassState>> {
        if let Some(entry) = self.classes.get(class) {
            return entry;
        }
        self.classes
            .entry(class.to_string())
            .or_insert_with(|| Mutex::new(ClassState::new(self.config.class(class))))
            .downgrade()
    }
}
