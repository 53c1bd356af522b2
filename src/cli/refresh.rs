//! The `refresh` subcommand: a bulk, rate-limited sweep over the pricing
//! API for a worklist of entity ids.

use std::sync::Arc;

use tracing::{debug, info};

use super::RefreshArgs;
use crate::batch::BatchRunner;
use crate::config::Config;
use crate::error::Result;
use crate::pricing::PricingClient;
use crate::store::{self, SqliteStateStore, StateStore};
use crate::throttle::{AdaptiveLimiter, TokenBucket};

pub async fn execute(args: RefreshArgs) -> Result<()> {
    let config = Config::load(&args.config)?;
    config.init_logging();

    let entity_ids = read_worklist(&args.input)?;
    if entity_ids.is_empty() {
        println!("Nothing to refresh: {} is empty", args.input.display());
        return Ok(());
    }

    let marketplace = args
        .marketplace
        .unwrap_or_else(|| config.seller.default_marketplace.clone());

    let pool = store::create_pool(&config.database)?;
    store::run_migrations(&pool)?;
    let state_store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::new(pool));

    let limiter = Arc::new(AdaptiveLimiter::new(config.throttle.clone()));
    let bucket = Arc::new(TokenBucket::from_config(&config.bucket));
    let client = Arc::new(PricingClient::new(&config.pricing)?);

    let runner = BatchRunner::new(
        limiter,
        bucket,
        state_store,
        config.batch.clone(),
        &config.pricing.api_class,
    );

    info!(
        items = entity_ids.len(),
        %marketplace,
        "refreshing competitive summaries"
    );

    let outcome = runner
        .process(
            entity_ids,
            move |entity_id: String| {
                let client = client.clone();
                let marketplace = marketplace.clone();
                async move {
                    let summary = client
                        .competitive_summary(&entity_id, &marketplace)
                        .await?;
                    debug!(
                        entity_id = %summary.entity_id,
                        total_offers = ?summary.total_offers,
                        lowest_price = ?summary.lowest_price,
                        "summary refreshed"
                    );
                    Ok(())
                }
            },
            None,
        )
        .await;

    println!(
        "Refreshed {} of {} listings ({} failed)",
        outcome.succeeded, outcome.processed, outcome.failed
    );
    Ok(())
}

fn read_worklist(path: &std::path::Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
