//! Application configuration loading and validation.
//!
//! Configuration is loaded from a TOML file with environment variable
//! overrides for deployment-specific values like `OFFERWATCH_QUEUE_URL`.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::domain::analyzer::AnalyzerConfig;
use crate::error::{ConfigError, Result};

mod logging;

pub use logging::LoggingConfig;

/// Main application configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Path to the SQLite database file.
    #[serde(default = "default_database")]
    pub database: String,
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    pub seller: SellerConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub bucket: BucketConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_database() -> String {
    "offerwatch.db".into()
}

/// Queue transport configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueConfig {
    /// Full URL of the notification queue.
    pub url: String,
    /// Queue region, forwarded as a request header for endpoint routing.
    #[serde(default)]
    pub region: String,
    /// Maximum messages per receive call.
    #[serde(default = "default_max_messages")]
    pub max_messages: u32,
    /// Long-poll wait per receive call, in seconds.
    #[serde(default = "default_wait_time_secs")]
    pub wait_time_secs: u32,
    /// Per-request transport timeout, in seconds. Must exceed the long-poll
    /// wait or every receive call times out client-side.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Fixed transport-level retry count, independent of the application
    /// retry policy.
    #[serde(default = "default_transport_retries")]
    pub transport_retries: u32,
}

fn default_max_messages() -> u32 {
    10
}

fn default_wait_time_secs() -> u32 {
    20
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_transport_retries() -> u32 {
    2
}

/// Worker loop configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Stable worker identifier recorded on raw events. Generated at startup
    /// when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Sleep between polls that return no messages, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Consecutive top-level loop errors before the circuit trips and the
    /// process exits.
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    /// Backoff after a top-level loop error, in seconds.
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
    /// Port for the liveness endpoint.
    #[serde(default = "default_health_port")]
    pub health_port: u16,
    /// How long a shutdown signal waits for the current cycle, in seconds.
    /// Must cover the long-poll wait or shutdown always aborts mid-poll.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_max_consecutive_errors() -> u32 {
    10
}

fn default_error_backoff_secs() -> u64 {
    5
}

fn default_health_port() -> u16 {
    8080
}

fn default_shutdown_grace_secs() -> u64 {
    25
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            id: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_consecutive_errors: default_max_consecutive_errors(),
            error_backoff_secs: default_error_backoff_secs(),
            health_port: default_health_port(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// Identity of the monitored seller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SellerConfig {
    /// Seller id used to locate "your" offer in notifications.
    pub seller_id: String,
    /// Marketplace assumed when a notification omits one.
    #[serde(default = "default_marketplace")]
    pub default_marketplace: String,
}

fn default_marketplace() -> String {
    "ATVPDKIKX0DER".into()
}

/// Adaptive spacing parameters for one API class.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiClassConfig {
    /// Floor for the adaptive delay, in milliseconds.
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    /// Ceiling for the adaptive delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Fixed sleep applied on isolated throttle responses, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Soft daily request quota; 0 disables tracking warnings.
    #[serde(default)]
    pub daily_quota: u64,
}

fn default_min_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

impl Default for ApiClassConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            daily_quota: 0,
        }
    }
}

/// Adaptive rate limiter configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThrottleConfig {
    /// Parameters applied to classes without an explicit entry.
    #[serde(default)]
    pub default: ApiClassConfig,
    /// Per-class overrides, keyed by API class name.
    #[serde(default)]
    pub classes: HashMap<String, ApiClassConfig>,
}

impl ThrottleConfig {
    /// Parameters for a class, falling back to the defaults.
    #[must_use]
    pub fn class(&self, name: &str) -> &ApiClassConfig {
        self.classes.get(name).unwrap_or(&self.default)
    }
}

/// Token bucket configuration (strict long-run ceiling).
#[derive(Debug, Clone, Deserialize)]
pub struct BucketConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: f64,
    /// Refill rate in tokens per second.
    #[serde(default = "default_refill_per_sec")]
    pub refill_per_sec: f64,
}

fn default_max_tokens() -> f64 {
    20.0
}

fn default_refill_per_sec() -> f64 {
    5.0
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            refill_per_sec: default_refill_per_sec(),
        }
    }
}

/// Batch dispatcher configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Items per contiguous chunk.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Workers in the bounded-concurrency pool; 1 runs items sequentially.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Cool-down between batches, in milliseconds; skipped after the last.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Maximum attempts per item.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base retry delay, in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Retry delay cap, in milliseconds.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Log progress every N items within a batch.
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
}

fn default_batch_size() -> usize {
    50
}

fn default_concurrency() -> usize {
    8
}

fn default_cooldown_ms() -> u64 {
    1_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_progress_every() -> usize {
    10
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            cooldown_ms: default_cooldown_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            progress_every: default_progress_every(),
        }
    }
}

/// Outbound pricing API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_pricing_api_url")]
    pub api_url: String,
    /// API class the pricing client is throttled under.
    #[serde(default = "default_pricing_api_class")]
    pub api_class: String,
    /// Per-request timeout, in seconds.
    #[serde(default = "default_pricing_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_pricing_api_url() -> String {
    "https://sellingpartnerapi-na.amazon.com".into()
}

fn default_pricing_api_class() -> String {
    "pricing".into()
}

fn default_pricing_timeout_secs() -> u64 {
    15
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            api_url: default_pricing_api_url(),
            api_class: default_pricing_api_class(),
            request_timeout_secs: default_pricing_timeout_secs(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;

        let mut config: Self = toml::from_str(&content).map_err(ConfigError::Parse)?;

        // Deployment-specific override; the config file usually carries a
        // staging queue.
        if let Ok(url) = std::env::var("OFFERWATCH_QUEUE_URL") {
            config.queue.url = url;
        }

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.queue.url.is_empty() {
            return Err(ConfigError::MissingField { field: "queue.url" }.into());
        }
        Url::parse(&self.queue.url).map_err(|e| ConfigError::InvalidValue {
            field: "queue.url",
            reason: e.to_string(),
        })?;
        if self.queue.request_timeout_secs <= u64::from(self.queue.wait_time_secs) {
            return Err(ConfigError::InvalidValue {
                field: "queue.request_timeout_secs",
                reason: "must exceed queue.wait_time_secs".into(),
            }
            .into());
        }
        if self.seller.seller_id.is_empty() {
            return Err(ConfigError::MissingField {
                field: "seller.seller_id",
            }
            .into());
        }
        if self.worker.max_consecutive_errors == 0 {
            return Err(ConfigError::InvalidValue {
                field: "worker.max_consecutive_errors",
                reason: "must be at least 1".into(),
            }
            .into());
        }
        if self.bucket.max_tokens <= 0.0 || self.bucket.refill_per_sec <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "bucket",
                reason: "max_tokens and refill_per_sec must be positive".into(),
            }
            .into());
        }
        if self.batch.batch_size == 0 || self.batch.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch",
                reason: "batch_size and concurrency must be at least 1".into(),
            }
            .into());
        }
        for (name, class) in std::iter::once(("default", &self.throttle.default))
            .chain(self.throttle.classes.iter().map(|(k, v)| (k.as_str(), v)))
        {
            if class.min_delay_ms > class.max_delay_ms {
                return Err(ConfigError::InvalidValue {
                    field: "throttle",
                    reason: format!("class '{name}': min_delay_ms exceeds max_delay_ms"),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Worker id from config, or a generated one.
    #[must_use]
    pub fn worker_id(&self) -> String {
        self.worker
            .id
            .clone()
            .unwrap_or_else(|| format!("worker-{}", uuid::Uuid::new_v4()))
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}
