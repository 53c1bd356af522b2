#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use offerwatch::config::Config;

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Write `contents` to a unique temp file and return its path.
pub fn write_temp_config(contents: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let suffix = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.push(format!("offerwatch-test-{nanos}-{suffix}.toml"));
    fs::write(&path, contents).expect("write temp config");
    path
}

/// The smallest configuration that passes validation.
pub fn minimal_config_toml() -> &'static str {
    r#"
[queue]
url = "https://sqs.us-east-1.example.com/123/offer-events"

[seller]
seller_id = "A2YOU"
"#
}

/// A parsed config with fast timings for worker-loop tests.
pub fn fast_worker_config() -> Config {
    toml::from_str(
        r#"
            [queue]
            url = "https://sqs.us-east-1.example.com/123/offer-events"

            [seller]
            seller_id = "A2YOU"

            [worker]
            id = "worker-test"
            poll_interval_ms = 1
            error_backoff_secs = 0
            max_consecutive_errors = 3
        "#,
    )
    .expect("parse test config")
}
