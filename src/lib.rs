//! Offerwatch - event-driven competitive pricing monitor.
//!
//! This crate consumes marketplace offer-change notifications from an
//! at-least-once queue, classifies the competitive exposure of each change,
//! and maintains a materialized current-state projection per listing. A
//! separate batch dispatcher drives bulk outbound calls to a quota-limited
//! pricing API.
//!
//! # Architecture
//!
//! The worker pipeline is: queue poll → envelope unwrap and normalization →
//! severity analysis → idempotent persistence → batch acknowledgment.
//! Redelivered messages are absorbed by a content-hash unique constraint,
//! so a crash anywhere before acknowledgment is safe to replay.
//!
//! The outbound path is independent: a worklist is chunked into batches and
//! dispatched through two gates — a token bucket as the strict throughput
//! ceiling and an adaptive per-class delay that grows under throttling and
//! decays on success — with per-item retries and dead-lettering.
//!
//! # Modules
//!
//! - [`config`] - Configuration loading from TOML with env overrides
//! - [`domain`] - Canonical notification model and the severity analyzer
//! - [`error`] - Error types for the crate
//! - [`queue`] - Queue transport trait and the SQS-compatible adapter
//! - [`store`] - Persistence gateway over the three pipeline tables
//! - [`worker`] - The poll-process-acknowledge loop, counters, health
//! - [`throttle`] - Token bucket and adaptive rate limiter
//! - [`batch`] - Chunked, retried, rate-limited bulk dispatch
//! - [`pricing`] - Outbound client for the pricing API
//! - [`cli`] - Command-line interface (`run`, `check`, `refresh`)

pub mod batch;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod pricing;
pub mod queue;
pub mod store;
pub mod throttle;
pub mod worker;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
