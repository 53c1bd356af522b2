//! Command-line interface definitions.

pub mod check;
pub mod refresh;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Offerwatch - event-driven competitive pricing monitor.
#[derive(Parser, Debug)]
#[command(name = "offerwatch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the notification worker (foreground)
    Run(ConfigPathArg),

    /// Validate configuration and report health checks
    Check(ConfigPathArg),

    /// Bulk-refresh competitive summaries for a list of entity ids
    Refresh(RefreshArgs),
}

/// Shared argument for commands that only need a config path.
#[derive(Parser, Debug)]
pub struct ConfigPathArg {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,
}

/// Arguments for the `refresh` subcommand.
#[derive(Parser, Debug)]
pub struct RefreshArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// File with one entity id per line
    #[arg(short, long)]
    pub input: PathBuf,

    /// Marketplace the summaries are fetched for; defaults to the
    /// configured default marketplace
    #[arg(long)]
    pub marketplace: Option<String>,
}
