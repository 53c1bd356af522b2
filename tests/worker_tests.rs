use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use rust_decimal_macros::dec;

use offerwatch::domain::{dedupe_hash, Severity};
use offerwatch::error::Error;
use offerwatch::testkit::queue::{message, ScriptedQueue};
use offerwatch::testkit::store::RecordingStore;
use offerwatch::testkit::wire::{envelope, offer, trigger_body};
use offerwatch::worker::{Worker, WorkerStats};

mod support;
use support::fast_worker_config;

const MARKETPLACE: &str = "ATVPDKIKX0DER";

struct Harness {
    queue: Arc<ScriptedQueue>,
    store: Arc<RecordingStore>,
    stats: Arc<WorkerStats>,
    worker: Worker,
}

/// Worker wired to scripted doubles; the queue flips the shutdown flag
/// once its poll script is exhausted, so `run()` winds down on its own.
fn harness(queue: ScriptedQueue, store: RecordingStore) -> Harness {
    let shutdown = Arc::new(AtomicBool::new(false));
    let queue = Arc::new(queue.shutdown_when_exhausted(shutdown.clone()));
    let store = Arc::new(store);
    let stats = Arc::new(WorkerStats::new());
    let worker = Worker::new(
        queue.clone(),
        store.clone(),
        stats.clone(),
        shutdown,
        &fast_worker_config(),
    );
    Harness {
        queue,
        store,
        stats,
        worker,
    }
}

fn competitive_body(entity_id: &str) -> String {
    trigger_body(
        entity_id,
        MARKETPLACE,
        &[
            offer("A1RIVAL", dec!(18.99)).buy_box(),
            offer("A3RIVAL", dec!(19.50)),
            offer("A4RIVAL", dec!(20.00)),
            offer("A2YOU", dec!(21.50)),
        ],
    )
}

#[tokio::test]
async fn processes_a_batch_end_to_end() {
    let body = competitive_body("B00AAA");
    let h = harness(
        ScriptedQueue::new().with_polls(vec![Ok(vec![message("m-1", &body)])]),
        RecordingStore::new(),
    );

    h.worker.run().await.unwrap();

    let events = h.store.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].entity_id, "B00AAA");
    assert_eq!(events[0].worker_id, "worker-test");
    assert_eq!(events[0].dedupe_hash, dedupe_hash(&body));

    let updates = h.store.state_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].marketplace, MARKETPLACE);
    assert_eq!(updates[0].analysis.severity, Severity::Warning);
    assert_eq!(updates[0].analysis.your_position, Some(4));

    // The full batch was acknowledged and its events completed.
    assert_eq!(h.queue.deleted_batches(), vec![vec!["m-1".to_string()]]);
    assert_eq!(h.store.completed_batches().len(), 1);

    let stats = h.stats.snapshot();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.duplicates, 0);
    assert_eq!(stats.errors, 0);
}

#[tokio::test]
async fn envelope_wrapped_messages_are_unwrapped() {
    let body = envelope(&competitive_body("B00ENV"));
    let h = harness(
        ScriptedQueue::new().with_polls(vec![Ok(vec![message("m-1", &body)])]),
        RecordingStore::new(),
    );

    h.worker.run().await.unwrap();

    assert_eq!(h.store.events()[0].entity_id, "B00ENV");
    // The dedupe hash covers the envelope exactly as received.
    assert_eq!(h.store.events()[0].dedupe_hash, dedupe_hash(&body));
}

#[tokio::test]
async fn duplicate_delivery_is_absorbed() {
    // Scenario D: identical body delivered twice in one run.
    let body = competitive_body("B00DUP");
    let h = harness(
        ScriptedQueue::new().with_polls(vec![Ok(vec![
            message("m-1", &body),
            message("m-2", &body),
        ])]),
        RecordingStore::new(),
    );

    h.worker.run().await.unwrap();

    // One raw event, one state update.
    assert_eq!(h.store.events().len(), 1);
    assert_eq!(h.store.state_updates().len(), 1);
    // No dead letter for the duplicate.
    assert!(h.store.failures().is_empty());
    // Both messages still count as handled and get acknowledged.
    assert_eq!(
        h.queue.deleted_batches(),
        vec![vec!["m-1".to_string(), "m-2".to_string()]]
    );

    let stats = h.stats.snapshot();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.errors, 0);
}

#[tokio::test]
async fn redelivery_across_polls_is_idempotent() {
    let body = competitive_body("B00REDELIVER");
    let h = harness(
        ScriptedQueue::new().with_polls(vec![
            Ok(vec![message("m-1", &body)]),
            Ok(vec![message("m-1", &body)]),
        ]),
        RecordingStore::new(),
    );

    h.worker.run().await.unwrap();

    assert_eq!(h.store.events().len(), 1);
    assert_eq!(h.store.state_updates().len(), 1);
    let stats = h.stats.snapshot();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.duplicates, 1);
}

#[tokio::test]
async fn state_update_failure_is_dead_lettered_and_isolated() {
    // Scenario E: the upsert throws for the first message; the batch
    // continues.
    let h = harness(
        ScriptedQueue::new().with_polls(vec![Ok(vec![
            message("m-bad", &competitive_body("B00BAD")),
            message("m-good", &competitive_body("B00GOOD")),
        ])]),
        RecordingStore::new()
            .with_state_update_errors(vec![Error::Database("disk I/O error".into())]),
    );

    h.worker.run().await.unwrap();

    let failures = h.store.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].message_id, "m-bad");
    assert_eq!(failures[0].error_type, "database");
    assert!(failures[0].error_message.contains("disk I/O error"));

    // The second message was processed normally.
    assert_eq!(h.store.state_updates().len(), 1);
    assert_eq!(h.store.state_updates()[0].entity_id, "B00GOOD");

    // Both messages acknowledged: the failed one is dead-lettered, not
    // redelivered forever.
    assert_eq!(
        h.queue.deleted_batches(),
        vec![vec!["m-bad".to_string(), "m-good".to_string()]]
    );

    let stats = h.stats.snapshot();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.errors, 1);
}

#[tokio::test]
async fn dead_letter_outage_does_not_cascade() {
    let h = harness(
        ScriptedQueue::new().with_polls(vec![Ok(vec![
            message("m-bad", &competitive_body("B00BAD")),
            message("m-good", &competitive_body("B00GOOD")),
        ])]),
        RecordingStore::new()
            .with_state_update_errors(vec![Error::Database("disk I/O error".into())])
            .with_dead_letter_errors(vec![Error::Database("dead letter table locked".into())]),
    );

    // The worker still finishes cleanly.
    h.worker.run().await.unwrap();

    assert!(h.store.failures().is_empty());
    assert_eq!(h.store.state_updates().len(), 1);
    assert_eq!(h.queue.deleted_batches().len(), 1);
}

#[tokio::test]
async fn unparseable_message_is_left_for_redelivery() {
    let h = harness(
        ScriptedQueue::new().with_polls(vec![Ok(vec![
            message("m-junk", "{not json"),
            message("m-good", &competitive_body("B00GOOD")),
        ])]),
        RecordingStore::new(),
    );

    h.worker.run().await.unwrap();

    // The junk message is neither dead-lettered nor acknowledged.
    assert!(h.store.failures().is_empty());
    assert_eq!(h.queue.deleted_batches(), vec![vec!["m-good".to_string()]]);

    let stats = h.stats.snapshot();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.errors, 1);
}

#[tokio::test]
async fn delete_failure_is_not_fatal() {
    let h = harness(
        ScriptedQueue::new()
            .with_polls(vec![Ok(vec![message("m-1", &competitive_body("B00A"))])])
            .with_delete_results(vec![Err(Error::Queue("delete refused".into()))]),
        RecordingStore::new(),
    );

    h.worker.run().await.unwrap();

    // Processing succeeded; only completion bookkeeping is skipped.
    assert_eq!(h.store.state_updates().len(), 1);
    assert!(h.store.completed_batches().is_empty());
    assert_eq!(h.stats.snapshot().errors, 0);
}

#[tokio::test]
async fn consecutive_poll_failures_trip_the_circuit() {
    let h = harness(
        ScriptedQueue::new().with_polls(vec![
            Err(Error::Queue("unreachable".into())),
            Err(Error::Queue("unreachable".into())),
            Err(Error::Queue("unreachable".into())),
        ]),
        RecordingStore::new(),
    );

    let result = h.worker.run().await;
    assert!(matches!(result, Err(Error::CircuitOpen { consecutive: 3 })));
    assert_eq!(h.stats.snapshot().consecutive_errors, 3);
}

#[tokio::test]
async fn successful_cycle_resets_the_error_streak() {
    let h = harness(
        ScriptedQueue::new().with_polls(vec![
            Err(Error::Queue("unreachable".into())),
            Err(Error::Queue("unreachable".into())),
            Ok(vec![message("m-1", &competitive_body("B00A"))]),
            Err(Error::Queue("unreachable".into())),
        ]),
        RecordingStore::new(),
    );

    // Four polls but never three consecutive failures: no trip.
    h.worker.run().await.unwrap();
    assert_eq!(h.stats.snapshot().processed, 1);
}

#[tokio::test]
async fn buy_box_win_is_recorded_as_success() {
    // Scenario A flowing through the whole pipeline.
    let body = trigger_body(
        "B00WIN",
        MARKETPLACE,
        &[
            offer("A2YOU", dec!(18.99)).buy_box(),
            offer("A1RIVAL", dec!(19.50)),
        ],
    );
    let h = harness(
        ScriptedQueue::new().with_polls(vec![Ok(vec![message("m-1", &body)])]),
        RecordingStore::new(),
    );

    h.worker.run().await.unwrap();

    let analysis = &h.store.state_updates()[0].analysis;
    assert_eq!(analysis.severity, Severity::Success);
    assert_eq!(analysis.your_position, Some(1));
    assert!(analysis.buy_box_winner);
}
