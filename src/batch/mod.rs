//! Bulk outbound dispatch against the quota-limited pricing API.
//!
//! A worklist is split into contiguous batches; batches run sequentially
//! with a cool-down in between, items inside a batch run on a
//! bounded-concurrency pool. Every dispatch passes the token bucket and the
//! adaptive limiter, and every item is wrapped in the shared
//! [`RetryPolicy`]; per-item failures are counted and dead-lettered, never
//! fatal to the job.

pub mod retry;
pub mod runner;

pub use retry::{classify, ErrorClass, RetryOutcome, RetryPolicy};
pub use runner::{create_batches, BatchOutcome, BatchProgress, BatchRunner, ProgressFn, WorkItem};
