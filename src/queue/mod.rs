//! Notification queue transport.
//!
//! The worker consumes an at-least-once queue: a message may be delivered
//! more than once, and a message that is never acknowledged reappears after
//! its visibility timeout. The [`NotificationQueue`] trait is the seam the
//! orchestrator is written against; [`SqsQueue`] is the HTTP adapter.

pub mod sqs;

use async_trait::async_trait;

use crate::error::Result;

pub use sqs::SqsQueue;

/// One message received from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: String,
    /// Opaque acknowledgment token, valid until the visibility timeout.
    pub receipt_handle: String,
    pub body: String,
}

/// Long-poll receive and batch acknowledgment against the notification queue.
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    /// Receive up to the configured number of messages, waiting up to the
    /// configured long-poll interval. An empty vec is a normal outcome.
    async fn poll(&self) -> Result<Vec<QueueMessage>>;

    /// Batch-acknowledge fully handled messages. A failure here is not
    /// fatal to the pipeline: redelivered messages are absorbed by the
    /// dedupe-hash idempotency.
    async fn delete_batch(&self, messages: &[QueueMessage]) -> Result<()>;
}
