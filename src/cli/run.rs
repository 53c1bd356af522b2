//! The `run` subcommand: the long-lived worker daemon.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};

use super::ConfigPathArg;
use crate::config::Config;
use crate::error::Result;
use crate::queue::{NotificationQueue, SqsQueue};
use crate::store::{self, SqliteStateStore, StateStore};
use crate::worker::{health, HealthState, Worker, WorkerStats};

pub async fn execute(args: ConfigPathArg) -> Result<()> {
    let config = Config::load(&args.config)?;
    config.init_logging();
    info!("offerwatch starting");

    let pool = store::create_pool(&config.database)?;
    store::run_migrations(&pool)?;
    let state_store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::new(pool));
    let queue: Arc<dyn NotificationQueue> = Arc::new(SqsQueue::new(config.queue.clone())?);

    let stats = Arc::new(WorkerStats::new());
    let shutdown = Arc::new(AtomicBool::new(false));

    let health_state = Arc::new(HealthState::new(
        stats.clone(),
        config.worker.max_consecutive_errors,
    ));
    let health_port = config.worker.health_port;
    tokio::spawn(async move {
        if let Err(err) = health::serve(health_port, health_state).await {
            error!(error = %err, "health endpoint failed");
        }
    });

    let grace = Duration::from_secs(config.worker.shutdown_grace_secs);
    let worker = Arc::new(Worker::new(
        queue,
        state_store,
        stats,
        shutdown.clone(),
        &config,
    ));

    let loop_worker = worker.clone();
    let mut worker_task = tokio::spawn(async move { loop_worker.run().await });

    let result = tokio::select! {
        joined = &mut worker_task => flatten(joined),
        _ = shutdown_signal() => {
            info!("shutdown signal received, finishing current cycle");
            shutdown.store(true, Ordering::Relaxed);

            match timeout(grace, &mut worker_task).await {
                Ok(joined) => flatten(joined),
                Err(_) => {
                    warn!(grace_secs = grace.as_secs(), "grace period elapsed, aborting");
                    worker_task.abort();
                    Ok(())
                }
            }
        }
    };

    info!("offerwatch stopped");
    result
}

/// Resolve on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let ctrl_c = tokio::signal::ctrl_c();
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn flatten(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result,
        Err(join_error) => {
            error!(error = %join_error, "worker task panicked");
            Err(crate::error::Error::Queue(join_error.to_string()))
        }
    }
}
