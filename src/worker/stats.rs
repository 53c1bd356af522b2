//! Worker counters shared with the health endpoint.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub duplicates: u64,
    pub errors: u64,
    pub consecutive_errors: u32,
}

/// Atomics-backed worker counters.
///
/// `processed` counts messages whose state projection was updated;
/// redeliveries absorbed by the dedupe hash land in `duplicates` instead.
/// `consecutive_errors` tracks top-level loop failures only and resets on
/// any successful cycle.
pub struct WorkerStats {
    started_at: Instant,
    processed: AtomicU64,
    duplicates: AtomicU64,
    errors: AtomicU64,
    consecutive_errors: AtomicU32,
}

impl WorkerStats {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            processed: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            consecutive_errors: AtomicU32::new(0),
        }
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a top-level loop failure; returns the new consecutive count.
    pub fn record_cycle_error(&self) -> u32 {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// A cycle completed; the consecutive failure streak is over.
    pub fn reset_consecutive(&self) {
        self.consecutive_errors.store(0, Ordering::SeqCst);
    }

    #[must_use]
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            consecutive_errors: self.consecutive_errors.load(Ordering::SeqCst),
        }
    }
}

impl Default for WorkerStats {
    fn default() -> Self {
        Self::new()
    }
}
