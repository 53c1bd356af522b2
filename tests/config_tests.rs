use std::fs;

use offerwatch::config::Config;
use offerwatch::error::{ConfigError, Error};

mod support;
use support::{minimal_config_toml, write_temp_config};

#[test]
fn load_reads_defaults_from_minimal_file() {
    let path = write_temp_config(minimal_config_toml());
    let config = Config::load(&path).unwrap();
    let _ = fs::remove_file(&path);

    assert_eq!(config.queue.max_messages, 10);
    assert_eq!(config.queue.wait_time_secs, 20);
    assert_eq!(config.worker.max_consecutive_errors, 10);
    assert_eq!(config.worker.shutdown_grace_secs, 25);
    assert_eq!(config.batch.batch_size, 50);
    assert_eq!(config.database, "offerwatch.db");
}

#[test]
fn load_rejects_missing_seller_id() {
    let toml = r#"
[queue]
url = "https://sqs.us-east-1.example.com/123/offer-events"

[seller]
seller_id = ""
"#;

    let path = write_temp_config(toml);
    let result = Config::load(&path);
    let _ = fs::remove_file(&path);

    match result {
        Err(Error::Config(ConfigError::MissingField {
            field: "seller.seller_id",
        })) => {}
        Err(err) => panic!("expected missing seller_id error, got {err}"),
        Ok(_) => panic!("expected missing seller_id to be rejected"),
    }
}

#[test]
fn load_rejects_unparseable_queue_url() {
    let toml = r#"
[queue]
url = "not a url at all"

[seller]
seller_id = "A2YOU"
"#;

    let path = write_temp_config(toml);
    let result = Config::load(&path);
    let _ = fs::remove_file(&path);

    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::InvalidValue {
            field: "queue.url",
            ..
        }))
    ));
}

#[test]
fn load_rejects_missing_file() {
    let result = Config::load("/nonexistent/offerwatch.toml");
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::ReadFile(_)))
    ));
}

#[test]
fn env_var_overrides_queue_url() {
    let path = write_temp_config(minimal_config_toml());

    std::env::set_var(
        "OFFERWATCH_QUEUE_URL",
        "https://sqs.eu-west-1.example.com/456/prod-events",
    );
    let config = Config::load(&path);
    std::env::remove_var("OFFERWATCH_QUEUE_URL");
    let _ = fs::remove_file(&path);

    assert_eq!(
        config.unwrap().queue.url,
        "https://sqs.eu-west-1.example.com/456/prod-events"
    );
}

#[test]
fn analyzer_thresholds_are_tunable() {
    let toml = r#"
[queue]
url = "https://sqs.us-east-1.example.com/123/offer-events"

[seller]
seller_id = "A2YOU"

[analyzer]
critical_gap_pct = 75
warning_min_offers = 6
"#;

    let path = write_temp_config(toml);
    let config = Config::load(&path).unwrap();
    let _ = fs::remove_file(&path);

    assert_eq!(
        config.analyzer.critical_gap_pct,
        rust_decimal::Decimal::from(75)
    );
    assert_eq!(config.analyzer.warning_min_offers, 6);
    // Untouched thresholds keep their defaults.
    assert_eq!(
        config.analyzer.high_gap_pct,
        rust_decimal::Decimal::from(20)
    );
}
