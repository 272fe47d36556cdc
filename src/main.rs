//! Scale driver CLI
//!
//! One-shot reads, a long-running watch mode and offline report decoding.

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use scale_driver::DriverConfig;

// CLI definitions
mod cli;
use cli::{Cli, Commands};

// Command handlers
mod commands;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging (stderr, so JSON output on stdout stays clean)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load config, then let command-line selectors win
    let config_path = cli.config.clone().unwrap_or_else(DriverConfig::default_path);
    debug!("Loading config from {:?}", config_path);
    let mut config = DriverConfig::load(&config_path)?;
    config.apply_overrides(
        cli.vendor_id,
        cli.product_id,
        cli.manufacturer.clone(),
        cli.model.clone(),
    );

    match cli.command {
        Commands::List => commands::device::list(&config),
        Commands::Read { json, attempts } => commands::device::read(&config, attempts, json),
        Commands::Watch { json } => commands::device::watch(config, json),
        Commands::Decode { hex } => commands::utility::decode(&hex),
        Commands::Config => commands::utility::config(&config),
    }
}
