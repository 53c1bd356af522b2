//! Persistence gateway: raw events, current state, dead letters.
//!
//! Three tables back the pipeline. `raw_events` is the idempotency ledger:
//! its unique constraint on the dedupe hash is the sole duplicate-detection
//! mechanism. `current_state` is a derived projection keyed by entity and
//! marketplace, overwritten last-writer-wins on every update. `dead_letters`
//! is an append-only record of messages that failed processing.
//!
//! No transaction spans the raw insert and the state upsert; a crash between
//! them leaves the projection stale until the next event for that entity.

pub mod model;
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::domain::Analysis;
use crate::error::{Error, Result};

pub use sqlite::SqliteStateStore;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Database connection pool type alias.
pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// Create a connection pool for the given database URL.
///
/// # Errors
/// Returns an error if the pool cannot be created.
pub fn create_pool(database_url: &str) -> Result<DbPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    Pool::builder()
        .max_size(5)
        .build(manager)
        .map_err(|e| Error::Connection(e.to_string()))
}

/// Run any pending embedded migrations.
pub fn run_migrations(pool: &DbPool) -> Result<()> {
    let mut conn = pool.get().map_err(|e| Error::Connection(e.to_string()))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| Error::Database(e.to_string()))?;
    Ok(())
}

/// Outcome of an idempotent raw-event insert.
///
/// A unique-constraint violation on the dedupe hash is a recognized signal,
/// not an error: redelivered messages surface here as [`Duplicate`]
/// (`InsertOutcome::Duplicate`) and the caller skips the state update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

impl InsertOutcome {
    #[must_use]
    pub fn is_duplicate(self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

/// Lifecycle of a raw event row.
///
/// Rows are inserted as `processing`, move to `processed` once the state
/// projection is updated, and to `completed` once the queue acknowledges
/// the batch. Dead-lettered messages keep their last status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventStatus {
    Processing,
    Processed,
    Completed,
}

impl RawEventStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for RawEventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw event at ingestion time, before it has a row id.
#[derive(Debug, Clone)]
pub struct NewRawEvent<'a> {
    pub message_id: &'a str,
    pub dedupe_hash: &'a str,
    pub raw_payload: &'a str,
    pub notification_type: &'a str,
    pub event_time: Option<DateTime<Utc>>,
    pub entity_id: &'a str,
    pub worker_id: &'a str,
}

/// A dead-letter record for a message that failed processing.
#[derive(Debug, Clone)]
pub struct NewFailure<'a> {
    pub message_id: &'a str,
    pub raw_message: &'a str,
    pub error_type: &'a str,
    pub error_message: &'a str,
    pub stack_trace: Option<&'a str>,
}

/// Persistence operations the pipeline is written against.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Insert a raw event, converting a dedupe-hash collision into
    /// [`InsertOutcome::Duplicate`]. Any other persistence error propagates.
    async fn store_notification(&self, event: NewRawEvent<'_>) -> Result<InsertOutcome>;

    /// Upsert the current-state projection for one (entity, marketplace)
    /// key, overwriting every field and stamping `last_updated`.
    async fn update_current_state(
        &self,
        entity_id: &str,
        marketplace: &str,
        analysis: &Analysis,
        payload: &str,
    ) -> Result<()>;

    /// Advance one raw event to `processed` after its state upsert.
    async fn mark_processed(&self, dedupe_hash: &str) -> Result<()>;

    /// Advance a batch of raw events to `completed` after acknowledgment.
    async fn mark_completed(&self, dedupe_hashes: &[String]) -> Result<()>;

    /// Append a dead-letter record. Callers treat a failure here as
    /// log-and-swallow; a dead-letter outage must never cascade.
    async fn store_failed(&self, failure: NewFailure<'_>) -> Result<()>;
}
