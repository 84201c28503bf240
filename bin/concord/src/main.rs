//! Concord - tracks the highest block a pool of Ethereum nodes agrees on.
//!
//! This binary provides the main entry point for running the consensus poller.

#[macro_use]
extern crate tracing;

use concord_cli::{Cli, Logger, check_config, clap::Parser, init_tracing};
use concord_config::ConcordConfig;
use eyre::{Context, Result};

/// Main entry point for concord.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_format)?;

    info!(config_path = %cli.config.display(), "Loading configuration");
    let config = ConcordConfig::from_file(&cli.config)
        .wrap_err_with(|| format!("failed to load config from {}", cli.config.display()))?;

    check_config!(cli);

    Logger::new().log(&config);

    concord_cli::run(&config).await
}
