//! CLI argument definitions for watchpost-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Watchpost OS log monitoring daemon.
///
/// Tails the systemd journal, classifies kernel and service anomalies
/// (GPU resets, thermal throttling, OOM, soft lockups), persists events
/// to SQLite, and notifies subscribers.
#[derive(Parser, Debug)]
#[command(name = "watchpost-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to watchpost.toml configuration file.
    #[arg(short, long, default_value = "/etc/watchpost/watchpost.toml")]
    pub config: PathBuf,

    /// Override event database path (takes precedence over config file).
    #[arg(long)]
    pub database: Option<String>,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}
