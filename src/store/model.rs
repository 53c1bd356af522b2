//! Database model types for Diesel ORM.

use diesel::prelude::*;

use super::schema::{current_state, dead_letters, raw_events};

/// Database row for a raw event (insertable).
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = raw_events)]
pub struct NewRawEventRow {
    pub message_id: String,
    pub dedupe_hash: String,
    pub raw_payload: String,
    pub notification_type: String,
    pub event_time: Option<String>,
    pub entity_id: String,
    pub worker_id: String,
    pub status: String,
}

/// Database row for a raw event (queryable).
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = raw_events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RawEventRow {
    pub id: Option<i32>,
    pub message_id: String,
    pub dedupe_hash: String,
    pub raw_payload: String,
    pub notification_type: String,
    pub event_time: Option<String>,
    pub entity_id: String,
    pub worker_id: String,
    pub status: String,
}

/// Database row for the current-state projection.
#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = current_state)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CurrentStateRow {
    pub entity_id: String,
    pub marketplace: String,
    pub your_price: Option<f64>,
    pub market_low: Option<f64>,
    pub prime_low: Option<f64>,
    pub your_position: Option<i32>,
    pub total_offers: Option<i32>,
    pub buy_box_winner: bool,
    pub severity: String,
    pub last_payload: String,
    pub last_updated: String,
}

/// Database row for a dead letter (insertable).
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = dead_letters)]
pub struct NewDeadLetterRow {
    pub message_id: String,
    pub raw_message: String,
    pub error_type: String,
    pub error_message: String,
    pub stack_trace: Option<String>,
    pub created_at: String,
}

/// Database row for a dead letter (queryable).
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = dead_letters)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DeadLetterRow {
    pub id: Option<i32>,
    pub message_id: String,
    pub raw_message: String,
    pub error_type: String,
    pub error_message: String,
    pub stack_trace: Option<String>,
    pub created_at: String,
}
