//! Scripted [`NotificationQueue`] double.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::queue::{NotificationQueue, QueueMessage};

/// Build a queue message with a receipt handle derived from the id.
#[must_use]
pub fn message(message_id: &str, body: &str) -> QueueMessage {
    QueueMessage {
        message_id: message_id.to_string(),
        receipt_handle: format!("rh-{message_id}"),
        body: body.to_string(),
    }
}

/// A queue double with pre-loaded poll results.
///
/// Each `poll()` pops the next scripted result; once the script is
/// exhausted, polls return empty and the optional shutdown flag is set so
/// a worker loop under test winds down on its own.
#[derive(Default)]
pub struct ScriptedQueue {
    polls: Mutex<VecDeque<Result<Vec<QueueMessage>>>>,
    delete_results: Mutex<VecDeque<Result<()>>>,
    deleted: Mutex<Vec<Vec<String>>>,
    shutdown_when_exhausted: Option<Arc<AtomicBool>>,
}

impl ScriptedQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_polls(mut self, polls: Vec<Result<Vec<QueueMessage>>>) -> Self {
        self.polls = Mutex::new(polls.into());
        self
    }

    #[must_use]
    pub fn with_delete_results(mut self, results: Vec<Result<()>>) -> Self {
        self.delete_results = Mutex::new(results.into());
        self
    }

    /// Set `flag` once the poll script runs dry.
    #[must_use]
    pub fn shutdown_when_exhausted(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_when_exhausted = Some(flag);
        self
    }

    /// Message ids acknowledged, one entry per delete call.
    #[must_use]
    pub fn deleted_batches(&self) -> Vec<Vec<String>> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl NotificationQueue for ScriptedQueue {
    async fn poll(&self) -> Result<Vec<QueueMessage>> {
        match self.polls.lock().pop_front() {
            Some(result) => result,
            None => {
                if let Some(flag) = &self.shutdown_when_exhausted {
                    flag.store(true, Ordering::Relaxed);
                }
                Ok(Vec::new())
            }
        }
    }

    async fn delete_batch(&self, messages: &[QueueMessage]) -> Result<()> {
        self.deleted
            .lock()
            .push(messages.iter().map(|m| m.message_id.clone()).collect());
        self.delete_results.lock().pop_front().unwrap_or(Ok(()))
    }
}
