//! SQS-compatible HTTP queue adapter (JSON protocol).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use super::{NotificationQueue, QueueMessage};
use crate::config::QueueConfig;
use crate::error::{Error, Result};

const RECEIVE_TARGET: &str = "AmazonSQS.ReceiveMessage";
const DELETE_BATCH_TARGET: &str = "AmazonSQS.DeleteMessageBatch";

/// Queue adapter speaking the SQS JSON protocol over plain HTTP.
///
/// Request signing is handled by the deployment (an ambient-identity proxy
/// fronts the queue); this client only carries the region routing header.
/// Every call has a bounded timeout and a fixed transport-level retry count,
/// independent of any application-level retry policy.
pub struct SqsQueue {
    client: reqwest::Client,
    config: QueueConfig,
}

impl SqsQueue {
    pub fn new(config: QueueConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Issue one protocol call with the fixed transport retry.
    async fn call(&self, target: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send(target, &body).await {
                Ok(response) => return Ok(response),
                Err(error) if attempt <= self.config.transport_retries => {
                    warn!(target, attempt, error = %error, "queue transport error, retrying");
                    sleep(Duration::from_millis(250 * u64::from(attempt))).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn send(&self, target: &str, body: &serde_json::Value) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .post(&self.config.url)
            .header("X-Amz-Target", target)
            .header("Content-Type", "application/x-amz-json-1.0");
        if !self.config.region.is_empty() {
            request = request.header("X-Amz-Region", &self.config.region);
        }
        let response = request.json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Queue(format!("{target} returned {status}: {text}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl NotificationQueue for SqsQueue {
    async fn poll(&self) -> Result<Vec<QueueMessage>> {
        let body = json!({
            "QueueUrl": self.config.url,
            "MaxNumberOfMessages": self.config.max_messages,
            "WaitTimeSeconds": self.config.wait_time_secs,
        });

        let response: ReceiveResponse = self
            .call(RECEIVE_TARGET, body)
            .await?
            .json()
            .await?;

        let messages: Vec<QueueMessage> = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| QueueMessage {
                message_id: m.message_id,
                receipt_handle: m.receipt_handle,
                body: m.body,
            })
            .collect();

        debug!(count = messages.len(), "polled queue");
        Ok(messages)
    }

    async fn delete_batch(&self, messages: &[QueueMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let entries: Vec<serde_json::Value> = messages
            .iter()
            .enumerate()
            .map(|(index, message)| {
                json!({
                    "Id": index.to_string(),
                    "ReceiptHandle": message.receipt_handle,
                })
            })
            .collect();

        let body = json!({
            "QueueUrl": self.config.url,
            "Entries": entries,
        });

        let response: DeleteBatchResponse = self
            .call(DELETE_BATCH_TARGET, body)
            .await?
            .json()
            .await?;

        // Partial delete failures only mean redelivery, which the dedupe
        // hash absorbs.
        for failed in response.failed.unwrap_or_default() {
            warn!(
                entry_id = %failed.id,
                code = %failed.code,
                "failed to delete message from queue"
            );
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ReceiveResponse {
    #[serde(rename = "Messages")]
    messages: Option<Vec<WireMessage>>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(rename = "MessageId")]
    message_id: String,
    #[serde(rename = "ReceiptHandle")]
    receipt_handle: String,
    #[serde(rename = "Body")]
    body: String,
}

#[derive(Debug, Deserialize)]
struct DeleteBatchResponse {
    #[serde(rename = "Failed")]
    failed: Option<Vec<FailedEntry>>,
}

#[derive(Debug, Deserialize)]
struct FailedEntry {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Code", default)]
    code: String,
}
