//! Ingest pipeline -- classification, gating, scoring, persistence, fan-out.
//!
//! A single task owns the whole pipeline: it drains the shared ingest
//! channel, turns raw journal records into events, scores them against
//! the per-category baseline, persists them, and publishes the stored
//! form to bus subscribers. Single ownership means the baseline tracker
//! needs no locking and stored events get bus notifications in insert
//! order.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use watchpost_core::metrics as m;
use watchpost_core::source::{IngestMessage, RawRecord};
use watchpost_core::types::{Category, Event, Severity, truncate_label};
use watchpost_monitor::{BaselineTracker, Classifier, severity_from_priority};
use watchpost_store::EventStore;

use crate::bus::EventBus;

/// Turn a raw journal record into an event, or drop it.
///
/// Content rules win over priority: a record the classifier matches is
/// kept regardless of its syslog priority. Unmatched records fall back
/// to the priority-derived severity and are dropped when that severity
/// is informational, so routine chatter never reaches the store.
pub fn build_event(classifier: &Classifier, record: &RawRecord) -> Option<Event> {
    let (category, severity, label) = match classifier.classify(&record.message) {
        Some(hit) => (hit.category, hit.severity, hit.label.to_owned()),
        None => {
            let severity = severity_from_priority(record.priority.unwrap_or(5));
            if severity == Severity::Info {
                return None;
            }
            (Category::System, severity, truncate_label(&record.message))
        }
    };

    let mut event = Event::new(category, severity, label);
    if let Some(timestamp) = record.timestamp {
        event.timestamp = timestamp;
    }

    event
        .details
        .insert("message".to_owned(), Value::from(record.message.clone()));
    if let Some(unit) = &record.unit {
        event
            .details
            .insert("unit".to_owned(), Value::from(unit.clone()));
    }
    if let Some(identifier) = &record.identifier {
        event
            .details
            .insert("identifier".to_owned(), Value::from(identifier.clone()));
    }
    if let Some(priority) = record.priority {
        event
            .details
            .insert("priority".to_owned(), Value::from(priority));
    }

    Some(event)
}

/// Spawn the ingest task.
///
/// The task runs until every sender of `rx` is dropped, then drains the
/// channel and exits. `anomaly_threshold <= 0` disables anomaly marking;
/// events are still counted in the baseline windows.
pub fn spawn_ingest(
    mut rx: mpsc::Receiver<IngestMessage>,
    classifier: Classifier,
    store: Arc<EventStore>,
    bus: Arc<EventBus>,
    anomaly_threshold: f64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut baseline = BaselineTracker::new();

        while let Some(message) = rx.recv().await {
            let mut event = match message {
                IngestMessage::Raw(record) => {
                    metrics::counter!(m::INGEST_RECORDS_TOTAL).increment(1);
                    match build_event(&classifier, &record) {
                        Some(event) => {
                            metrics::counter!(m::INGEST_CLASSIFIED_TOTAL).increment(1);
                            event
                        }
                        None => {
                            metrics::counter!(m::INGEST_GATED_TOTAL).increment(1);
                            continue;
                        }
                    }
                }
                IngestMessage::Event(event) => event,
            };

            baseline.observe(&event);
            if anomaly_threshold > 0.0 {
                let score = baseline.score(&event);
                event.anomaly_score = Some(score);
                event.anomalous = Some(score >= anomaly_threshold);
                if score >= anomaly_threshold {
                    tracing::warn!(
                        category = %event.category,
                        score,
                        threshold = anomaly_threshold,
                        "event frequency above baseline threshold"
                    );
                }
            }

            match store.insert(&event) {
                Ok(id) => {
                    event.id = id;
                    tracing::debug!(id, category = %event.category, severity = %event.severity, "event stored");
                    bus.publish(&event.to_json_string());
                }
                Err(e) => {
                    metrics::counter!(m::INGEST_INSERT_FAILURES_TOTAL).increment(1);
                    tracing::warn!(error = %e, category = %event.category, "event insert failed, notification skipped");
                }
            }
        }

        tracing::debug!("ingest channel closed, ingest task exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn classifier() -> Classifier {
        Classifier::new().unwrap()
    }

    fn record(message: &str, priority: Option<u8>) -> RawRecord {
        RawRecord {
            message: message.to_owned(),
            priority,
            ..RawRecord::default()
        }
    }

    #[test]
    fn classified_record_keeps_rule_severity() {
        let event = build_event(
            &classifier(),
            &record("amdgpu 0000:03:00.0: [drm] GPU reset begin!", Some(3)),
        )
        .unwrap();
        assert_eq!(event.category, Category::Gpu);
        assert_eq!(event.severity, Severity::Error);
        assert_eq!(event.label, "GPU hang/reset");
        assert_eq!(event.details["message"], "amdgpu 0000:03:00.0: [drm] GPU reset begin!");
        assert_eq!(event.details["priority"], 3);
    }

    #[test]
    fn unmatched_info_priority_is_dropped() {
        assert!(build_event(&classifier(), &record("Started Session 42 of User alice.", Some(6))).is_none());
        // missing priority defaults to informational
        assert!(build_event(&classifier(), &record("Started Session 42 of User alice.", None)).is_none());
    }

    #[test]
    fn unmatched_severe_priority_is_kept_as_system() {
        let event = build_event(&classifier(), &record("disk I/O failure on sda", Some(2))).unwrap();
        assert_eq!(event.category, Category::System);
        assert_eq!(event.severity, Severity::Critical);
        assert_eq!(event.label, "disk I/O failure on sda");
    }

    #[test]
    fn content_rule_wins_over_low_priority() {
        // informational priority, but the content rule still matches
        let event = build_event(&classifier(), &record("thermal throttling active", Some(6))).unwrap();
        assert_eq!(event.category, Category::Thermal);
    }

    #[test]
    fn unmatched_label_is_truncated() {
        let long = "critical storage subsystem degradation ".repeat(10);
        let event = build_event(&classifier(), &record(&long, Some(2))).unwrap();
        assert!(event.label.chars().count() <= watchpost_core::types::MAX_LABEL_LEN);
        // full message survives in details
        assert_eq!(event.details["message"], long.as_str());
    }

    #[test]
    fn record_timestamp_is_preserved() {
        let mut r = record("oom-killer invoked by kswapd0", Some(4));
        r.timestamp = Utc.timestamp_millis_opt(1_750_000_000_000).single();
        let event = build_event(&classifier(), &r).unwrap();
        assert_eq!(event.timestamp.timestamp_millis(), 1_750_000_000_000);
    }

    #[test]
    fn unit_and_identifier_land_in_details() {
        let mut r = record("Out of memory: Killed process 1234 (chrome)", Some(3));
        r.unit = Some("session-2.scope".to_owned());
        r.identifier = Some("kernel".to_owned());
        let event = build_event(&classifier(), &r).unwrap();
        assert_eq!(event.details["unit"], "session-2.scope");
        assert_eq!(event.details["identifier"], "kernel");
    }

    #[tokio::test]
    async fn ingest_task_stores_and_publishes() {
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        let bus = Arc::new(EventBus::new(16));
        let mut notifications = bus.subscribe();
        let (tx, rx) = mpsc::channel(16);

        let handle = spawn_ingest(rx, classifier(), Arc::clone(&store), Arc::clone(&bus), 20.0);

        let r = record("watchdog: BUG: soft lockup - CPU#2 stuck for 23s!", Some(3));
        tx.send(IngestMessage::Raw(r)).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let payload = notifications.recv().await.unwrap();
        let event = Event::from_json_string(&payload).unwrap();
        assert!(event.id > 0);
        assert_eq!(event.category, Category::System);
        assert_eq!(event.label, "CPU soft lockup");
        assert_eq!(event.anomaly_score, Some(1.0));
        assert_eq!(event.anomalous, Some(false));

        let stored = store.query_range(0, i64::MAX, &[]).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, event.id);
    }

    #[tokio::test]
    async fn ingest_task_gates_informational_noise() {
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        let bus = Arc::new(EventBus::new(16));
        let (tx, rx) = mpsc::channel(16);

        let handle = spawn_ingest(rx, classifier(), Arc::clone(&store), bus, 20.0);

        tx.send(IngestMessage::Raw(record("Reached target Sleep.", Some(6))))
            .await
            .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert!(store.query_range(0, i64::MAX, &[]).unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_threshold_disables_anomaly_marking() {
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        let bus = Arc::new(EventBus::new(16));
        let (tx, rx) = mpsc::channel(16);

        let handle = spawn_ingest(rx, classifier(), Arc::clone(&store), bus, 0.0);

        tx.send(IngestMessage::Raw(record("amdgpu: GPU fault detected", Some(3))))
            .await
            .unwrap();
        drop(tx);
        handle.await.unwrap();

        let stored = store.query_range(0, i64::MAX, &[]).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].anomaly_score.is_none());
        assert!(stored[0].anomalous.is_none());
    }

    #[tokio::test]
    async fn injected_events_bypass_classification() {
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        let bus = Arc::new(EventBus::new(16));
        let (tx, rx) = mpsc::channel(16);

        let handle = spawn_ingest(rx, classifier(), Arc::clone(&store), bus, 20.0);

        // label that no content rule would produce
        let event = Event::new(Category::Update, Severity::Info, "Synthetic check");
        tx.send(IngestMessage::Event(event)).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let stored = store.query_range(0, i64::MAX, &[]).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].category, Category::Update);
        assert_eq!(stored[0].label, "Synthetic check");
    }

    #[tokio::test]
    async fn anomaly_flag_set_once_threshold_reached() {
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        let bus = Arc::new(EventBus::new(64));
        let (tx, rx) = mpsc::channel(64);

        let handle = spawn_ingest(rx, classifier(), Arc::clone(&store), bus, 3.0);

        for _ in 0..3 {
            tx.send(IngestMessage::Raw(record("amdgpu: ring gfx timeout", Some(3))))
                .await
                .unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        let stored = store.query_range(0, i64::MAX, &[]).unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].anomalous, Some(false));
        assert_eq!(stored[1].anomalous, Some(false));
        assert_eq!(stored[2].anomalous, Some(true));
        assert_eq!(stored[2].anomaly_score, Some(3.0));
    }
}
