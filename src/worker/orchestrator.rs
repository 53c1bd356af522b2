//! The poll → analyze → persist → acknowledge worker loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use super::stats::WorkerStats;
use crate::config::Config;
use crate::domain::{analyze, dedupe_hash, AnalyzerConfig, Notification};
use crate::error::{Error, Result};
use crate::queue::{NotificationQueue, QueueMessage};
use crate::store::{NewFailure, NewRawEvent, StateStore};

/// Where the loop currently is in its cycle.
///
/// `CircuitOpen` is terminal: the loop returns an error and the process
/// exits non-zero for the supervisor to restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Polling,
    Processing,
    Acknowledging,
    CircuitOpen,
}

/// How one message left the handler.
enum Handled {
    /// Fully processed (or absorbed as a duplicate); acknowledge it.
    Done { dedupe_hash: String },
    /// Dead-lettered; acknowledge it so it is not redelivered forever.
    Failed,
    /// Unparseable; leave it for the queue to redeliver.
    Unparsed,
}

/// Single-task worker that drains the notification queue.
///
/// One poll-process-acknowledge cycle completes before the next poll
/// begins. Failures are isolated per message; only top-level cycle errors
/// (queue unreachable, pool exhausted) count toward the circuit breaker.
pub struct Worker {
    queue: Arc<dyn NotificationQueue>,
    store: Arc<dyn StateStore>,
    stats: Arc<WorkerStats>,
    shutdown: Arc<AtomicBool>,
    seller_id: String,
    default_marketplace: String,
    worker_id: String,
    analyzer: AnalyzerConfig,
    poll_interval: Duration,
    error_backoff: Duration,
    max_consecutive_errors: u32,
    phase: Mutex<Phase>,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn NotificationQueue>,
        store: Arc<dyn StateStore>,
        stats: Arc<WorkerStats>,
        shutdown: Arc<AtomicBool>,
        config: &Config,
    ) -> Self {
        Self {
            queue,
            store,
            stats,
            shutdown,
            seller_id: config.seller.seller_id.clone(),
            default_marketplace: config.seller.default_marketplace.clone(),
            worker_id: config.worker_id(),
            analyzer: config.analyzer.clone(),
            poll_interval: Duration::from_millis(config.worker.poll_interval_ms),
            error_backoff: Duration::from_secs(config.worker.error_backoff_secs),
            max_consecutive_errors: config.worker.max_consecutive_errors,
            phase: Mutex::new(Phase::Idle),
        }
    }

    /// Current loop phase, for diagnostics.
    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock() = phase;
    }

    /// Run until the shutdown flag is set or the circuit trips.
    pub async fn run(&self) -> Result<()> {
        info!(worker_id = %self.worker_id, "worker starting");

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("shutdown flag set, stopping after current cycle");
                break;
            }

            match self.cycle().await {
                Ok(received) => {
                    self.stats.reset_consecutive();
                    if received == 0 {
                        sleep(self.poll_interval).await;
                    }
                }
                Err(err) => {
                    let consecutive = self.stats.record_cycle_error();
                    error!(error = %err, consecutive, "worker cycle failed");

                    if consecutive >= self.max_consecutive_errors {
                        self.set_phase(Phase::CircuitOpen);
                        return Err(Error::CircuitOpen { consecutive });
                    }
                    sleep(self.error_backoff).await;
                }
            }
        }

        Ok(())
    }

    /// One full poll-process-acknowledge cycle; returns messages received.
    async fn cycle(&self) -> Result<usize> {
        self.set_phase(Phase::Polling);
        let messages = self.queue.poll().await?;
        if messages.is_empty() {
            self.set_phase(Phase::Idle);
            return Ok(0);
        }

        self.set_phase(Phase::Processing);
        let mut acknowledgable = Vec::with_capacity(messages.len());
        let mut completed_hashes = Vec::with_capacity(messages.len());
        for message in &messages {
            match self.handle_message(message).await {
                Handled::Done { dedupe_hash } => {
                    acknowledgable.push(message.clone());
                    completed_hashes.push(dedupe_hash);
                }
                Handled::Failed => acknowledgable.push(message.clone()),
                Handled::Unparsed => {}
            }
        }

        self.set_phase(Phase::Acknowledging);
        if !acknowledgable.is_empty() {
            // A delete failure only means redelivery, which the dedupe
            // hash absorbs; it must not count as a cycle error.
            if let Err(err) = self.queue.delete_batch(&acknowledgable).await {
                warn!(error = %err, "failed to acknowledge batch");
            } else if let Err(err) = self.store.mark_completed(&completed_hashes).await {
                warn!(error = %err, "failed to mark events completed");
            }
        }

        self.set_phase(Phase::Idle);
        Ok(messages.len())
    }

    /// Handle one message in isolation; never returns an error.
    async fn handle_message(&self, message: &QueueMessage) -> Handled {
        let notification = match Notification::parse(&message.body) {
            Ok(notification) => notification,
            Err(err) => {
                warn!(
                    message_id = %message.message_id,
                    error = %err,
                    "unparseable message left for redelivery"
                );
                self.stats.record_error();
                return Handled::Unparsed;
            }
        };

        match self.process_notification(message, &notification).await {
            Ok(ProcessOutcome::Stored { dedupe_hash }) => {
                self.stats.record_processed();
                Handled::Done { dedupe_hash }
            }
            Ok(ProcessOutcome::Duplicate { dedupe_hash }) => {
                debug!(
                    message_id = %message.message_id,
                    entity_id = %notification.entity_id,
                    "duplicate delivery absorbed"
                );
                self.stats.record_duplicate();
                Handled::Done { dedupe_hash }
            }
            Err(err) => {
                error!(
                    message_id = %message.message_id,
                    entity_id = %notification.entity_id,
                    error = %err,
                    "message processing failed"
                );
                self.stats.record_error();

                let failure = NewFailure {
                    message_id: &message.message_id,
                    raw_message: &message.body,
                    error_type: error_type(&err),
                    error_message: &err.to_string(),
                    stack_trace: None,
                };
                if let Err(dead) = self.store.store_failed(failure).await {
                    // A dead-letter outage must not cascade.
                    warn!(error = %dead, "dead letter write failed");
                }
                Handled::Failed
            }
        }
    }

    async fn process_notification(
        &self,
        message: &QueueMessage,
        notification: &Notification,
    ) -> Result<ProcessOutcome> {
        let hash = dedupe_hash(&message.body);
        let analysis = analyze(notification, &self.seller_id, &self.analyzer);

        let outcome = self
            .store
            .store_notification(NewRawEvent {
                message_id: &message.message_id,
                dedupe_hash: &hash,
                raw_payload: &message.body,
                notification_type: &notification.notification_type,
                event_time: notification.event_time,
                entity_id: &notification.entity_id,
                worker_id: &self.worker_id,
            })
            .await?;

        if outcome.is_duplicate() {
            return Ok(ProcessOutcome::Duplicate { dedupe_hash: hash });
        }

        let marketplace = notification
            .marketplace
            .as_deref()
            .unwrap_or(&self.default_marketplace);
        self.store
            .update_current_state(&notification.entity_id, marketplace, &analysis, &message.body)
            .await?;
        self.store.mark_processed(&hash).await?;

        debug!(
            entity_id = %notification.entity_id,
            marketplace,
            severity = %analysis.severity,
            position = ?analysis.your_position,
            "state updated"
        );
        Ok(ProcessOutcome::Stored { dedupe_hash: hash })
    }
}

enum ProcessOutcome {
    Stored { dedupe_hash: String },
    Duplicate { dedupe_hash: String },
}

fn error_type(error: &Error) -> &'static str {
    match error {
        Error::Database(_) => "database",
        Error::Connection(_) => "connection",
        Error::Queue(_) => "queue",
        Error::Parse(_) | Error::Json(_) => "parse",
        Error::RateLimited(_) => "rate_limited",
        _ => "other",
    }
}
