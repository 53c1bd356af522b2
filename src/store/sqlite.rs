//! SQLite state store implementation using Diesel.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::result::DatabaseErrorKind;
use rust_decimal::prelude::ToPrimitive;

use super::model::{CurrentStateRow, DeadLetterRow, NewDeadLetterRow, NewRawEventRow, RawEventRow};
use super::schema::{current_state, dead_letters, raw_events};
use super::{DbPool, InsertOutcome, NewFailure, NewRawEvent, RawEventStatus, StateStore};
use crate::domain::Analysis;
use crate::error::{Error, Result};

type PooledConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// SQLite-backed state store.
pub struct SqliteStateStore {
    pool: DbPool,
}

impl SqliteStateStore {
    /// Create a new SQLite state store.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<PooledConn> {
        self.pool.get().map_err(|e| Error::Connection(e.to_string()))
    }

    fn event_row(event: &NewRawEvent<'_>) -> NewRawEventRow {
        NewRawEventRow {
            message_id: event.message_id.to_string(),
            dedupe_hash: event.dedupe_hash.to_string(),
            raw_payload: event.raw_payload.to_string(),
            notification_type: event.notification_type.to_string(),
            event_time: event.event_time.map(|t| t.to_rfc3339()),
            entity_id: event.entity_id.to_string(),
            worker_id: event.worker_id.to_string(),
            status: RawEventStatus::Processing.as_str().to_string(),
        }
    }

    fn state_row(
        entity_id: &str,
        marketplace: &str,
        analysis: &Analysis,
        payload: &str,
    ) -> CurrentStateRow {
        CurrentStateRow {
            entity_id: entity_id.to_string(),
            marketplace: marketplace.to_string(),
            your_price: analysis.your_price.and_then(|p| p.to_f64()),
            market_low: analysis.market_low.and_then(|p| p.to_f64()),
            prime_low: analysis.prime_low.and_then(|p| p.to_f64()),
            your_position: analysis.your_position.map(|p| p as i32),
            total_offers: analysis.total_offers.map(|n| n as i32),
            buy_box_winner: analysis.buy_box_winner,
            severity: analysis.severity.as_str().to_string(),
            last_payload: payload.to_string(),
            last_updated: Utc::now().to_rfc3339(),
        }
    }

    /// Current-state row for one key, for diagnostics and tests.
    pub fn fetch_current_state(
        &self,
        entity_id: &str,
        marketplace: &str,
    ) -> Result<Option<CurrentStateRow>> {
        let mut conn = self.conn()?;
        current_state::table
            .find((entity_id, marketplace))
            .first(&mut *conn)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Raw event row for one dedupe hash, for diagnostics and tests.
    pub fn fetch_raw_event(&self, dedupe_hash: &str) -> Result<Option<RawEventRow>> {
        let mut conn = self.conn()?;
        raw_events::table
            .filter(raw_events::dedupe_hash.eq(dedupe_hash))
            .first(&mut *conn)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// All dead-letter rows, oldest first, for diagnostics and tests.
    pub fn fetch_dead_letters(&self) -> Result<Vec<DeadLetterRow>> {
        let mut conn = self.conn()?;
        dead_letters::table
            .order(dead_letters::id.asc())
            .load(&mut *conn)
            .map_err(|e| Error::Database(e.to_string()))
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn store_notification(&self, event: NewRawEvent<'_>) -> Result<InsertOutcome> {
        let row = Self::event_row(&event);
        let mut conn = self.conn()?;

        match diesel::insert_into(raw_events::table)
            .values(&row)
            .execute(&mut *conn)
        {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(Error::Database(e.to_string())),
        }
    }

    async fn update_current_state(
        &self,
        entity_id: &str,
        marketplace: &str,
        analysis: &Analysis,
        payload: &str,
    ) -> Result<()> {
        let row = Self::state_row(entity_id, marketplace, analysis, payload);
        let mut conn = self.conn()?;

        diesel::insert_into(current_state::table)
            .values(&row)
            .on_conflict((current_state::entity_id, current_state::marketplace))
            .do_update()
            .set(&row)
            .execute(&mut *conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn mark_processed(&self, dedupe_hash: &str) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(raw_events::table.filter(raw_events::dedupe_hash.eq(dedupe_hash)))
            .set(raw_events::status.eq(RawEventStatus::Processed.as_str()))
            .execute(&mut *conn)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn mark_completed(&self, dedupe_hashes: &[String]) -> Result<()> {
        if dedupe_hashes.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        diesel::update(raw_events::table.filter(raw_events::dedupe_hash.eq_any(dedupe_hashes)))
            .set(raw_events::status.eq(RawEventStatus::Completed.as_str()))
            .execute(&mut *conn)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn store_failed(&self, failure: NewFailure<'_>) -> Result<()> {
        let row = NewDeadLetterRow {
            message_id: failure.message_id.to_string(),
            raw_message: failure.raw_message.to_string(),
            error_type: failure.error_type.to_string(),
            error_message: failure.error_message.to_string(),
            stack_trace: failure.stack_trace.map(str::to_string),
            created_at: Utc::now().to_rfc3339(),
        };
        let mut conn = self.conn()?;

        diesel::insert_into(dead_letters::table)
            .values(&row)
            .execute(&mut *conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Severity;
    use crate::store::{create_pool, run_migrations};
    use rust_decimal_macros::dec;

    fn setup_test_db() -> DbPool {
        let pool = create_pool(":memory:").expect("Failed to create pool");
        run_migrations(&pool).expect("Failed to run migrations");
        pool
    }

    fn sample_event<'a>(hash: &'a str, message_id: &'a str) -> NewRawEvent<'a> {
        NewRawEvent {
            message_id,
            dedupe_hash: hash,
            raw_payload: "{}",
            notification_type: "ANY_OFFER_CHANGED",
            event_time: None,
            entity_id: "B00TEST",
            worker_id: "worker-1",
        }
    }

    fn sample_analysis() -> Analysis {
        Analysis {
            severity: Severity::Warning,
            your_price: Some(dec!(21.50)),
            market_low: Some(dec!(18.99)),
            prime_low: None,
            total_offers: Some(5),
            your_position: Some(4),
            buy_box_winner: false,
        }
    }

    #[tokio::test]
    async fn duplicate_hash_is_a_signal_not_an_error() {
        let store = SqliteStateStore::new(setup_test_db());

        let first = store
            .store_notification(sample_event("hash-1", "m-1"))
            .await
            .unwrap();
        assert_eq!(first, InsertOutcome::Inserted);

        // Same hash, different message id: redelivery.
        let second = store
            .store_notification(sample_event("hash-1", "m-2"))
            .await
            .unwrap();
        assert_eq!(second, InsertOutcome::Duplicate);

        let row = store.fetch_raw_event("hash-1").unwrap().unwrap();
        assert_eq!(row.message_id, "m-1");
        assert_eq!(row.status, "processing");
    }

    #[tokio::test]
    async fn upsert_overwrites_every_field() {
        let store = SqliteStateStore::new(setup_test_db());

        store
            .update_current_state("B00TEST", "ATVPDKIKX0DER", &sample_analysis(), "{\"v\":1}")
            .await
            .unwrap();

        let improved = Analysis {
            severity: Severity::Success,
            your_price: Some(dec!(18.50)),
            market_low: Some(dec!(18.50)),
            prime_low: Some(dec!(18.99)),
            total_offers: Some(6),
            your_position: Some(1),
            buy_box_winner: true,
        };
        store
            .update_current_state("B00TEST", "ATVPDKIKX0DER", &improved, "{\"v\":2}")
            .await
            .unwrap();

        let row = store
            .fetch_current_state("B00TEST", "ATVPDKIKX0DER")
            .unwrap()
            .unwrap();
        assert_eq!(row.severity, "success");
        assert_eq!(row.your_position, Some(1));
        assert!(row.buy_box_winner);
        assert_eq!(row.last_payload, "{\"v\":2}");
    }

    #[tokio::test]
    async fn keys_differing_in_marketplace_get_separate_rows() {
        let store = SqliteStateStore::new(setup_test_db());

        store
            .update_current_state("B00TEST", "ATVPDKIKX0DER", &sample_analysis(), "{}")
            .await
            .unwrap();
        store
            .update_current_state("B00TEST", "A1F83G8C2ARO7P", &sample_analysis(), "{}")
            .await
            .unwrap();

        assert!(store
            .fetch_current_state("B00TEST", "ATVPDKIKX0DER")
            .unwrap()
            .is_some());
        assert!(store
            .fetch_current_state("B00TEST", "A1F83G8C2ARO7P")
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn status_advances_through_lifecycle() {
        let store = SqliteStateStore::new(setup_test_db());

        store
            .store_notification(sample_event("hash-1", "m-1"))
            .await
            .unwrap();

        store.mark_processed("hash-1").await.unwrap();
        let row = store.fetch_raw_event("hash-1").unwrap().unwrap();
        assert_eq!(row.status, "processed");

        store
            .mark_completed(&["hash-1".to_string()])
            .await
            .unwrap();
        let row = store.fetch_raw_event("hash-1").unwrap().unwrap();
        assert_eq!(row.status, "completed");
    }

    #[tokio::test]
    async fn dead_letters_append() {
        let store = SqliteStateStore::new(setup_test_db());

        for n in 0..2 {
            store
                .store_failed(NewFailure {
                    message_id: &format!("m-{n}"),
                    raw_message: "{}",
                    error_type: "database",
                    error_message: "locked",
                    stack_trace: None,
                })
                .await
                .unwrap();
        }

        let letters = store.fetch_dead_letters().unwrap();
        assert_eq!(letters.len(), 2);
        assert_eq!(letters[0].message_id, "m-0");
        assert_eq!(letters[1].message_id, "m-1");
    }
}
