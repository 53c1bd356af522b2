//! The `check` subcommand: offline configuration and health validation.

use super::ConfigPathArg;
use crate::config::Config;
use crate::worker::{health_check, HealthStatus};

/// Validate the configuration file without starting the worker.
pub fn execute(args: ConfigPathArg) {
    let path = args.config.as_path();
    println!("Checking configuration: {}", path.display());
    println!();

    if !path.exists() {
        eprintln!("Error: configuration file not found: {}", path.display());
        eprintln!();
        eprintln!("Create one by copying the example:");
        eprintln!("  cp config.toml.example config.toml");
        std::process::exit(1);
    }

    let config = match Config::load(path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("✗ Configuration is invalid: {err}");
            std::process::exit(1);
        }
    };

    println!("✓ Configuration file is valid");
    println!();
    println!("Summary:");
    println!("  Queue: {}", config.queue.url);
    println!("  Database: {}", config.database);
    println!("  Seller: {}", config.seller.seller_id);
    println!("  Worker id: {}", config.worker_id());
    println!("  Health port: {}", config.worker.health_port);
    println!();

    let report = health_check(&config);
    for check in report.checks() {
        match check.status() {
            HealthStatus::Healthy => println!("✓ {}", check.name()),
            HealthStatus::Unhealthy(reason) => {
                let marker = if check.critical() { "✗" } else { "⚠" };
                println!("{marker} {}: {reason}", check.name());
            }
        }
    }

    if !report.is_healthy() {
        println!();
        eprintln!("Critical health checks failed");
        std::process::exit(1);
    }
}
