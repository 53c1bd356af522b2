//! Recording [`StateStore`] double.

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::Analysis;
use crate::error::{Error, Result};
use crate::store::{InsertOutcome, NewFailure, NewRawEvent, StateStore};

/// Owned copy of a raw-event insert.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub message_id: String,
    pub dedupe_hash: String,
    pub entity_id: String,
    pub notification_type: String,
    pub worker_id: String,
}

/// Owned copy of a state upsert.
#[derive(Debug, Clone)]
pub struct RecordedStateUpdate {
    pub entity_id: String,
    pub marketplace: String,
    pub analysis: Analysis,
    pub payload: String,
}

/// Owned copy of a dead-letter insert.
#[derive(Debug, Clone)]
pub struct RecordedFailure {
    pub message_id: String,
    pub error_type: String,
    pub error_message: String,
}

/// A store double that records every call.
///
/// Duplicate detection mirrors the real store: a dedupe hash seen before
/// yields [`InsertOutcome::Duplicate`]. Error scripts are consumed
/// front-to-back, one per matching call.
#[derive(Default)]
pub struct RecordingStore {
    events: Mutex<Vec<RecordedEvent>>,
    state_updates: Mutex<Vec<RecordedStateUpdate>>,
    failures: Mutex<Vec<RecordedFailure>>,
    processed_hashes: Mutex<Vec<String>>,
    completed_batches: Mutex<Vec<Vec<String>>>,
    seen_hashes: Mutex<HashSet<String>>,
    insert_errors: Mutex<VecDeque<Error>>,
    state_update_errors: Mutex<VecDeque<Error>>,
    dead_letter_errors: Mutex<VecDeque<Error>>,
}

impl RecordingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next raw-event inserts with these errors, in order.
    #[must_use]
    pub fn with_insert_errors(self, errors: Vec<Error>) -> Self {
        *self.insert_errors.lock() = errors.into();
        self
    }

    /// Fail the next state upserts with these errors, in order.
    #[must_use]
    pub fn with_state_update_errors(self, errors: Vec<Error>) -> Self {
        *self.state_update_errors.lock() = errors.into();
        self
    }

    /// Fail the next dead-letter inserts with these errors, in order.
    #[must_use]
    pub fn with_dead_letter_errors(self, errors: Vec<Error>) -> Self {
        *self.dead_letter_errors.lock() = errors.into();
        self
    }

    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    #[must_use]
    pub fn state_updates(&self) -> Vec<RecordedStateUpdate> {
        self.state_updates.lock().clone()
    }

    #[must_use]
    pub fn failures(&self) -> Vec<RecordedFailure> {
        self.failures.lock().clone()
    }

    #[must_use]
    pub fn processed_hashes(&self) -> Vec<String> {
        self.processed_hashes.lock().clone()
    }

    #[must_use]
    pub fn completed_batches(&self) -> Vec<Vec<String>> {
        self.completed_batches.lock().clone()
    }
}

#[async_trait]
impl StateStore for RecordingStore {
    async fn store_notification(&self, event: NewRawEvent<'_>) -> Result<InsertOutcome> {
        if let Some(error) = self.insert_errors.lock().pop_front() {
            return Err(error);
        }

        if !self.seen_hashes.lock().insert(event.dedupe_hash.to_string()) {
            return Ok(InsertOutcome::Duplicate);
        }

        self.events.lock().push(RecordedEvent {
            message_id: event.message_id.to_string(),
            dedupe_hash: event.dedupe_hash.to_string(),
            entity_id: event.entity_id.to_string(),
            notification_type: event.notification_type.to_string(),
            worker_id: event.worker_id.to_string(),
        });
        Ok(InsertOutcome::Inserted)
    }

    async fn update_current_state(
        &self,
        entity_id: &str,
        marketplace: &str,
        analysis: &Analysis,
        payload: &str,
    ) -> Result<()> {
        if let Some(error) = self.state_update_errors.lock().pop_front() {
            return Err(error);
        }

        self.state_updates.lock().push(RecordedStateUpdate {
            entity_id: entity_id.to_string(),
            marketplace: marketplace.to_string(),
            analysis: analysis.clone(),
            payload: payload.to_string(),
        });
        Ok(())
    }

    async fn mark_processed(&self, dedupe_hash: &str) -> Result<()> {
        self.processed_hashes.lock().push(dedupe_hash.to_string());
        Ok(())
    }

    async fn mark_completed(&self, dedupe_hashes: &[String]) -> Result<()> {
        self.completed_batches.lock().push(dedupe_hashes.to_vec());
        Ok(())
    }

    async fn store_failed(&self, failure: NewFailure<'_>) -> Result<()> {
        if let Some(error) = self.dead_letter_errors.lock().pop_front() {
            return Err(error);
        }

        self.failures.lock().push(RecordedFailure {
            message_id: failure.message_id.to_string(),
            error_type: failure.error_type.to_string(),
            error_message: failure.error_message.to_string(),
        });
        Ok(())
    }
}
