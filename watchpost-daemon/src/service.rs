//! Daemon-facing service surface.
//!
//! [`DaemonService`] is the handle embedding layers (control sockets,
//! test harnesses) use to talk to a running daemon: range queries over
//! stored events, live subscription, and synthetic event injection for
//! end-to-end verification.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use watchpost_core::error::{PipelineError, WatchpostError};
use watchpost_core::source::IngestMessage;
use watchpost_core::types::{Category, Event, Severity, truncate_label};
use watchpost_store::EventStore;

use crate::bus::EventBus;

/// Query and injection handle over a running daemon.
///
/// Cheap to clone; all state lives behind `Arc`s shared with the
/// orchestrator.
#[derive(Clone)]
pub struct DaemonService {
    store: Arc<EventStore>,
    bus: Arc<EventBus>,
    ingest_tx: mpsc::Sender<IngestMessage>,
}

impl DaemonService {
    /// Assemble a service handle from the daemon's shared state.
    pub fn new(
        store: Arc<EventStore>,
        bus: Arc<EventBus>,
        ingest_tx: mpsc::Sender<IngestMessage>,
    ) -> Self {
        Self {
            store,
            bus,
            ingest_tx,
        }
    }

    /// Query stored events in `[from_ms, to_ms]` as a JSON array string.
    ///
    /// `categories` holds wire-format names; unrecognized names fall back
    /// to `system`, and an empty slice means no category filter. Query
    /// failures are logged and reported as an empty array so callers
    /// always receive valid JSON.
    pub fn get_events(&self, from_ms: i64, to_ms: i64, categories: &[String]) -> String {
        let parsed: Vec<Category> = categories
            .iter()
            .map(|name| Category::from_str_loose(name).unwrap_or_default())
            .collect();

        match self.store.query_range(from_ms, to_ms, &parsed) {
            Ok(events) => {
                let array: Vec<Value> = events.iter().map(Event::to_json).collect();
                Value::Array(array).to_string()
            }
            Err(e) => {
                tracing::error!(error = %e, from_ms, to_ms, "event range query failed");
                "[]".to_owned()
            }
        }
    }

    /// Subscribe to notifications for events stored after this call.
    pub fn subscribe(&self) -> mpsc::Receiver<String> {
        self.bus.subscribe()
    }

    /// Inject a synthetic event into the ingest pipeline.
    ///
    /// The event takes the same path as classified journal records
    /// (baseline scoring, persistence, fan-out), which makes this the
    /// end-to-end liveness probe. Unrecognized category/severity names
    /// fall back to `system`/`info`; `details_json` must be a JSON
    /// object and is dropped (with a warning) otherwise.
    pub async fn inject_test_event(
        &self,
        category: &str,
        severity: &str,
        label: &str,
        details_json: &str,
    ) -> Result<(), WatchpostError> {
        let category = Category::from_str_loose(category).unwrap_or_default();
        let severity = Severity::from_str_loose(severity).unwrap_or_default();

        let mut event = Event::new(category, severity, truncate_label(label));
        match serde_json::from_str::<Value>(details_json) {
            Ok(Value::Object(map)) => event.details = map,
            Ok(_) | Err(_) if details_json.trim().is_empty() => {}
            Ok(_) | Err(_) => {
                tracing::warn!("injected event details are not a JSON object, ignored");
            }
        }

        self.ingest_tx
            .send(IngestMessage::Event(event))
            .await
            .map_err(|e| WatchpostError::Pipeline(PipelineError::ChannelSend(e.to_string())))
    }
}
