//! Chunked, rate-limited batch dispatch with per-item retry.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use super::retry::{ErrorClass, RetryOutcome, RetryPolicy};
use crate::config::BatchConfig;
use crate::error::Result;
use crate::store::{NewFailure, StateStore};
use crate::throttle::{AdaptiveLimiter, TokenBucket};

/// An item a batch job can dispatch.
///
/// The identifier ends up on dead-letter records when retries exhaust, so
/// it should be stable and meaningful (an entity id, not an index).
pub trait WorkItem: Send + Sync + 'static {
    fn id(&self) -> &str;

    /// Payload text recorded on dead letters.
    fn describe(&self) -> String {
        self.id().to_string()
    }
}

impl WorkItem for String {
    fn id(&self) -> &str {
        self
    }
}

/// Split a worklist into contiguous chunks of at most `size` items.
#[must_use]
pub fn create_batches<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut iter = items.into_iter();
    loop {
        let chunk: Vec<T> = iter.by_ref().take(size).collect();
        if chunk.is_empty() {
            break;
        }
        batches.push(chunk);
    }
    batches
}

/// Per-item progress snapshot passed to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
}

/// Final accounting for one worklist: `processed` equals the item count
/// and `succeeded + failed == processed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub type ProgressFn = Arc<dyn Fn(BatchProgress) + Send + Sync>;

#[derive(Default)]
struct Counters {
    processed: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

/// Drives bulk outbound work against a quota-limited API.
///
/// Batches run sequentially with a cool-down in between; items inside a
/// batch run on a bounded-concurrency pool pulling from a shared cursor,
/// so each item is claimed and dispatched exactly once. Every dispatch is
/// gated by the token bucket (strict ceiling) and the adaptive limiter
/// (spacing heuristic); every item runs under the shared retry policy, and
/// exhausted items are dead-lettered, never fatal to the job.
pub struct BatchRunner {
    limiter: Arc<AdaptiveLimiter>,
    bucket: Arc<TokenBucket>,
    store: Arc<dyn StateStore>,
    policy: RetryPolicy,
    config: BatchConfig,
    api_class: Arc<str>,
}

impl BatchRunner {
    pub fn new(
        limiter: Arc<AdaptiveLimiter>,
        bucket: Arc<TokenBucket>,
        store: Arc<dyn StateStore>,
        config: BatchConfig,
        api_class: &str,
    ) -> Self {
        Self {
            limiter,
            bucket,
            store,
            policy: RetryPolicy::from_config(&config),
            config,
            api_class: api_class.into(),
        }
    }

    /// Process a worklist to completion and return the accounting.
    pub async fn process<T, F, Fut>(
        &self,
        items: Vec<T>,
        item_fn: F,
        on_progress: Option<ProgressFn>,
    ) -> BatchOutcome
    where
        T: WorkItem + Clone,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let total = items.len();
        let item_fn = Arc::new(item_fn);
        let counters = Arc::new(Counters::default());
        let batches = create_batches(items, self.config.batch_size);
        let batch_count = batches.len();

        info!(items = total, batches = batch_count, "batch job starting");

        for (index, batch) in batches.into_iter().enumerate() {
            self.run_batch(batch, &item_fn, &counters, total, &on_progress)
                .await;

            if index + 1 < batch_count {
                sleep(Duration::from_millis(self.config.cooldown_ms)).await;
            }
        }

        let outcome = BatchOutcome {
            processed: counters.processed.load(Ordering::SeqCst),
            succeeded: counters.succeeded.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
        };
        info!(
            processed = outcome.processed,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "batch job finished"
        );
        outcome
    }

    async fn run_batch<T, F, Fut>(
        &self,
        batch: Vec<T>,
        item_fn: &Arc<F>,
        counters: &Arc<Counters>,
        total: usize,
        on_progress: &Option<ProgressFn>,
    ) where
        T: WorkItem + Clone,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let workers = self.config.concurrency.min(batch.len()).max(1);
        let batch = Arc::new(batch);
        let cursor = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let batch = batch.clone();
            let cursor = cursor.clone();
            let item_fn = item_fn.clone();
            let counters = counters.clone();
            let on_progress = on_progress.clone();
            let limiter = self.limiter.clone();
            let bucket = self.bucket.clone();
            let store = self.store.clone();
            let policy = self.policy.clone();
            let api_class = self.api_class.clone();
            let progress_every = self.config.progress_every;

            handles.push(tokio::spawn(async move {
                loop {
                    // Claim before dispatch: each index is handed to
                    // exactly one worker.
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    if index >= batch.len() {
                        break;
                    }
                    let item = batch[index].clone();

                    let ok = process_item(
                        item,
                        &item_fn,
                        &limiter,
                        &bucket,
                        &store,
                        &policy,
                        &api_class,
                    )
                    .await;

                    if ok {
                        counters.succeeded.fetch_add(1, Ordering::SeqCst);
                    } else {
                        counters.failed.fetch_add(1, Ordering::SeqCst);
                    }
                    let processed = counters.processed.fetch_add(1, Ordering::SeqCst) + 1;

                    if let Some(callback) = &on_progress {
                        callback(BatchProgress {
                            processed,
                            succeeded: counters.succeeded.load(Ordering::SeqCst),
                            failed: counters.failed.load(Ordering::SeqCst),
                            total,
                        });
                    }
                    if progress_every > 0 && processed % progress_every == 0 {
                        info!(processed, total, "batch progress");
                    }
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// Dispatch one item under the retry policy; true on success.
async fn process_item<T, F, Fut>(
    item: T,
    item_fn: &Arc<F>,
    limiter: &Arc<AdaptiveLimiter>,
    bucket: &Arc<TokenBucket>,
    store: &Arc<dyn StateStore>,
    policy: &RetryPolicy,
    api_class: &Arc<str>,
) -> bool
where
    T: WorkItem + Clone,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let outcome = policy
        .run(
            || {
                let item = item.clone();
                let item_fn = item_fn.clone();
                let limiter = limiter.clone();
                let bucket = bucket.clone();
                let api_class = api_class.clone();
                async move {
                    // Both gates run before every dispatch, retries included.
                    bucket.consume(1.0).await;
                    limiter.wait_for_slot(&api_class).await;
                    (*item_fn)(item).await
                }
            },
            |class| {
                let limiter = limiter.clone();
                let api_class = api_class.clone();
                async move {
                    if class == ErrorClass::RateLimited {
                        limiter.on_rate_limited(&api_class).await;
                    }
                }
            },
        )
        .await;

    match outcome {
        RetryOutcome::Succeeded { attempts, .. } => {
            limiter.on_success(api_class);
            if attempts > 1 {
                debug!(item = item.id(), attempts, "item succeeded after retries");
            }
            true
        }
        RetryOutcome::Exhausted { error, attempts } => {
            warn!(item = item.id(), attempts, error = %error, "item failed");
            let raw_message = item.describe();
            let error_message = format!("{error} (after {attempts} attempts)");
            let failure = NewFailure {
                message_id: item.id(),
                raw_message: &raw_message,
                error_type: "batch_retry_exhausted",
                error_message: &error_message,
                stack_trace: None,
            };
            if let Err(dead) = store.store_failed(failure).await {
                warn!(error = %dead, "dead letter write failed");
            }
            false
        }
    }
}
