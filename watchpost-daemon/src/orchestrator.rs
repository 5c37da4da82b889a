//! Daemon orchestration -- assembly, channel wiring, and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `watchpost-daemon`.
//! It validates configuration, opens the event store, wires the shared
//! ingest channel, builds enabled log sources, and runs the main loop
//! until a shutdown signal arrives.
//!
//! # Shutdown Order (producers first)
//!
//! 1. Stop log sources in reverse start order (no new records)
//! 2. Drop the orchestrator's ingest sender
//! 3. Join the ingest task (drains remaining records, then exits)

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use watchpost_core::config::WatchpostConfig;
use watchpost_core::source::{IngestMessage, LogSource};
use watchpost_monitor::{Classifier, JournalFollower, JournalPoller, LoadSampler};
use watchpost_store::EventStore;

use crate::bus::EventBus;
use crate::ingest;
use crate::service::DaemonService;

/// Channel capacity constants.
const INGEST_CHANNEL_CAPACITY: usize = 1024;
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

/// The main daemon orchestrator.
///
/// Owns the event store, the fan-out bus, and every log source for the
/// lifetime of the daemon.
pub struct Orchestrator {
    config: WatchpostConfig,
    store: Arc<EventStore>,
    bus: Arc<EventBus>,
    sources: Vec<Box<dyn LogSource>>,
    ingest_tx: Option<mpsc::Sender<IngestMessage>>,
    ingest_rx: Option<mpsc::Receiver<IngestMessage>>,
    classifier: Option<Classifier>,
}

impl Orchestrator {
    /// Load configuration from `config_path` and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read, parsed, or
    /// validated, or if the event database cannot be opened.
    #[allow(dead_code)] // Public API for tests
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = WatchpostConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config)
    }

    /// Build from an already-loaded configuration.
    ///
    /// Useful for testing or when config has already been loaded.
    pub fn build_from_config(config: WatchpostConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        let store = EventStore::open(&config.store.path)
            .with_context(|| format!("failed to open event database at {}", config.store.path))?;
        let store = Arc::new(store);

        let bus = Arc::new(EventBus::new(SUBSCRIBER_CHANNEL_CAPACITY));
        let (ingest_tx, ingest_rx) = mpsc::channel(INGEST_CHANNEL_CAPACITY);

        let classifier =
            Classifier::new().map_err(|e| anyhow::anyhow!("failed to build classifier: {}", e))?;

        let mut sources: Vec<Box<dyn LogSource>> = Vec::new();

        if config.journal.enabled {
            match config.journal.mode.as_str() {
                "poll" => {
                    tracing::info!(
                        interval_secs = config.journal.poll_interval_secs,
                        "initializing journal poller"
                    );
                    sources.push(Box::new(JournalPoller::new(
                        config.journal.journalctl_path.as_str(),
                        Duration::from_secs(config.journal.poll_interval_secs),
                        ingest_tx.clone(),
                    )));
                }
                // validate() restricts mode to "follow" | "poll"
                _ => {
                    tracing::info!("initializing journal follower");
                    sources.push(Box::new(JournalFollower::new(
                        config.journal.journalctl_path.as_str(),
                        ingest_tx.clone(),
                    )));
                }
            }
        }

        if config.sampler.enabled {
            tracing::info!(
                interval_secs = config.sampler.interval_secs,
                threshold = config.sampler.load_threshold,
                "initializing load sampler"
            );
            sources.push(Box::new(LoadSampler::new(
                Duration::from_secs(config.sampler.interval_secs),
                config.sampler.load_threshold,
                ingest_tx.clone(),
            )));
        }

        tracing::info!(total_sources = sources.len(), "orchestrator initialized");

        Ok(Self {
            config,
            store,
            bus,
            sources,
            ingest_tx: Some(ingest_tx),
            ingest_rx: Some(ingest_rx),
            classifier: Some(classifier),
        })
    }

    /// Start the ingest pipeline and all log sources, then block until a
    /// shutdown signal is received.
    ///
    /// A source that fails to start is logged and skipped; the daemon
    /// keeps running with the remaining sources. Sources can also fail
    /// later (journalctl exiting) without taking the daemon down.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` (from systemd or `kill`)
    /// - `SIGINT` (Ctrl+C)
    pub async fn run(&mut self) -> Result<()> {
        if !self.config.general.pid_file.is_empty() {
            let path = Path::new(&self.config.general.pid_file);
            write_pid_file(path)?;
        }

        let ingest_handle = match self.spawn_ingest_task() {
            Ok(handle) => handle,
            Err(e) => {
                self.cleanup_pid_file();
                return Err(e);
            }
        };

        tracing::info!("starting log sources");
        for source in &mut self.sources {
            if let Err(e) = source.start().await {
                tracing::error!(source = source.name(), error = %e, "source failed to start");
            } else {
                tracing::info!(source = source.name(), "source started");
            }
        }

        tracing::info!("entering main event loop");
        let signal = wait_for_shutdown_signal().await?;
        tracing::info!(signal = signal, "shutdown signal received");

        self.shutdown(ingest_handle).await;
        self.cleanup_pid_file();

        Ok(())
    }

    /// Get a service handle for queries, subscription, and injection.
    ///
    /// # Errors
    ///
    /// Fails once [`run`](Self::run) has completed, as the ingest channel
    /// is closed during shutdown.
    pub fn service(&self) -> Result<DaemonService> {
        let ingest_tx = self
            .ingest_tx
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("daemon is shut down, ingest channel closed"))?;
        Ok(DaemonService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.bus),
            ingest_tx.clone(),
        ))
    }

    /// Get a reference to the loaded configuration.
    #[allow(dead_code)] // Public API for introspection
    pub fn config(&self) -> &WatchpostConfig {
        &self.config
    }

    fn spawn_ingest_task(&mut self) -> Result<JoinHandle<()>> {
        let ingest_rx = self
            .ingest_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("orchestrator already ran"))?;
        let classifier = self
            .classifier
            .take()
            .ok_or_else(|| anyhow::anyhow!("orchestrator already ran"))?;
        Ok(ingest::spawn_ingest(
            ingest_rx,
            classifier,
            Arc::clone(&self.store),
            Arc::clone(&self.bus),
            self.config.baseline.anomaly_threshold,
        ))
    }

    /// Stop sources in reverse start order, then drain the ingest task.
    async fn shutdown(&mut self, ingest_handle: JoinHandle<()>) {
        tracing::info!("stopping log sources");
        for source in self.sources.iter_mut().rev() {
            if let Err(e) = source.stop().await {
                tracing::warn!(source = source.name(), error = %e, "source stop failed");
            }
        }

        // Closing the last sender lets the ingest task drain and exit.
        self.ingest_tx = None;
        if let Err(e) = ingest_handle.await {
            tracing::error!(error = %e, "ingest task panicked");
        }
        tracing::info!("ingest pipeline drained");
    }

    fn cleanup_pid_file(&self) {
        if !self.config.general.pid_file.is_empty() {
            let path = Path::new(&self.config.general.pid_file);
            remove_pid_file(path);
        }
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Write the current process PID to a file, failing if one already exists.
///
/// Guards against duplicate daemon instances. The file is created
/// atomically with `create_new(true)`, verified to be a regular file,
/// and restricted to 0o600 (parent directory 0o700).
fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = fs::DirBuilder::new();
            builder.mode(0o700).recursive(true);
            builder.create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_string());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    // reject symlinks and other special files
    let metadata = file.metadata()?;
    if !metadata.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file (possible symlink attack)",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        file.set_permissions(permissions)?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove PID file"
        );
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}
