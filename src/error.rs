use thiserror::Error;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Malformed envelope or notification body. Messages raising this are
    /// neither acknowledged nor dead-lettered; the queue redelivers them
    /// after the visibility timeout.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("connection error: {0}")]
    Connection(String),

    /// The remote API throttled us (HTTP 429 or a quota-exceeded body).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Consecutive top-level loop failures crossed the configured threshold.
    /// The process exits non-zero and an external supervisor restarts it.
    #[error("circuit breaker open after {consecutive} consecutive errors")]
    CircuitOpen { consecutive: u32 },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, Error>;
