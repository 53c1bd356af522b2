//! Startup health checks and the liveness endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::info;

use super::stats::{StatsSnapshot, WorkerStats};
use crate::config::Config;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

#[derive(Debug, Clone)]
pub struct HealthCheck {
    name: &'static str,
    critical: bool,
    status: HealthStatus,
}

impl HealthCheck {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn critical(&self) -> bool {
        self.critical
    }

    pub fn status(&self) -> &HealthStatus {
        &self.status
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthStatus::Healthy)
    }
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    checks: Vec<HealthCheck>,
}

impl HealthReport {
    pub fn checks(&self) -> &[HealthCheck] {
        &self.checks
    }

    pub fn is_healthy(&self) -> bool {
        self.checks
            .iter()
            .filter(|check| check.critical())
            .all(HealthCheck::is_healthy)
    }
}

/// Offline validation of the configured collaborators. No network calls;
/// this gates startup and backs the `check` subcommand.
pub fn health_check(config: &Config) -> HealthReport {
    let mut checks = Vec::new();

    checks.push(HealthCheck {
        name: "database",
        critical: true,
        status: if config.database.trim().is_empty() {
            HealthStatus::Unhealthy("database path is empty".to_string())
        } else {
            HealthStatus::Healthy
        },
    });

    checks.push(HealthCheck {
        name: "queue_endpoint",
        critical: true,
        status: match url::Url::parse(&config.queue.url) {
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(format!("queue url invalid: {e}")),
        },
    });

    checks.push(HealthCheck {
        name: "seller_id",
        critical: true,
        status: if config.seller.seller_id.trim().is_empty() {
            HealthStatus::Unhealthy("seller_id is empty".to_string())
        } else {
            HealthStatus::Healthy
        },
    });

    checks.push(HealthCheck {
        name: "throttle_classes",
        critical: false,
        status: {
            let inverted = std::iter::once(&config.throttle.default)
                .chain(config.throttle.classes.values())
                .any(|class| class.min_delay_ms > class.max_delay_ms);
            if inverted {
                HealthStatus::Unhealthy("a throttle class has min_delay above max_delay".to_string())
            } else {
                HealthStatus::Healthy
            }
        },
    });

    HealthReport { checks }
}

/// Shared state behind the liveness endpoint.
pub struct HealthState {
    stats: Arc<WorkerStats>,
    max_consecutive_errors: u32,
}

impl HealthState {
    #[must_use]
    pub fn new(stats: Arc<WorkerStats>, max_consecutive_errors: u32) -> Self {
        Self {
            stats,
            max_consecutive_errors,
        }
    }

    fn body(&self) -> HealthBody {
        let stats = self.stats.snapshot();
        HealthBody {
            healthy: stats.consecutive_errors < self.max_consecutive_errors,
            uptime_secs: self.stats.uptime_secs(),
            stats,
        }
    }
}

/// Response shape of `GET /healthz`.
#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub healthy: bool,
    pub uptime_secs: u64,
    pub stats: StatsSnapshot,
}

/// Serve `GET /healthz` until the process exits.
///
/// Liveness only: the supervisor restarts the process when this reports
/// unhealthy, it is not a readiness gate on consumption.
pub async fn serve(port: u16, state: Arc<HealthState>) -> Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "health endpoint listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthz(State(state): State<Arc<HealthState>>) -> Json<HealthBody> {
    Json(state.body())
}
