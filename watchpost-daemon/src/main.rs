//! watchpost-daemon entry point.
//!
//! Parses CLI arguments, loads and validates configuration, initializes
//! logging, and hands control to the [`orchestrator::Orchestrator`].

use anyhow::Result;
use clap::Parser;

use watchpost_core::config::WatchpostConfig;
use watchpost_daemon::cli::DaemonCli;
use watchpost_daemon::logging;
use watchpost_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let args = DaemonCli::parse();

    let mut config = WatchpostConfig::load(&args.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config from {:?}: {}", args.config, e))?;

    // CLI overrides win over config file and environment
    if let Some(log_level) = args.log_level {
        config.general.log_level = log_level;
    }
    if let Some(log_format) = args.log_format {
        config.general.log_format = log_format;
    }
    if let Some(database) = args.database {
        config.store.path = database;
    }
    if let Some(pid_file) = args.pid_file {
        config.general.pid_file = pid_file;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    if args.validate {
        println!("configuration OK: {:?}", args.config);
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        "watchpost-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config)?;
    orchestrator.run().await?;

    tracing::info!("watchpost-daemon shut down");
    Ok(())
}
