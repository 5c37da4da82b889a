//! SQLite 이벤트 스토어
//!
//! [`EventStore`]는 분류된 모든 이벤트의 내구성 기록을 독점 소유합니다.
//! 연결은 내부 `Mutex`로 감싸 `Arc<EventStore>` 공유를 허용합니다 —
//! 쓰기는 인제스트 태스크 한 곳에서만 오므로 쓰기-쓰기 경합은 구조적으로
//! 없고, 동시 읽기 쿼리는 호출 시점에 커밋된 행을 봅니다.
//!
//! 실패 의미론: 열기/스키마 실패는 데몬 기동을 중단시키고, 개별 insert
//! 실패는 호출자가 경고 후 이벤트를 버립니다 (재시도 없음).

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{TimeZone, Utc};
use rusqlite::{Connection, params, params_from_iter, types::Value as SqlValue};
use serde_json::{Map, Value};
use tracing::debug;

use watchpost_core::error::StoreError;
use watchpost_core::types::{Category, Event, Severity};

/// 스키마 버전 — `meta` 테이블에 기록
const SCHEMA_VERSION: &str = "1";

/// 내구성 이벤트 스토어
pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    /// 파일 기반 데이터베이스를 열고 스키마를 초기화합니다.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn =
            Connection::open(path.as_ref()).map_err(|e| StoreError::Open(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// 인메모리 데이터베이스를 엽니다 (테스트용).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// 이벤트 테이블, 보조 인덱스, 스키마 버전 마커를 생성합니다.
    ///
    /// 멱등 — 이미 존재하면 아무것도 바꾸지 않습니다.
    pub fn init_schema(&self) -> Result<(), StoreError> {
        self.conn()
            .execute_batch(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    timestamp_ms INTEGER NOT NULL,
                    category TEXT NOT NULL,
                    severity TEXT NOT NULL,
                    label TEXT NOT NULL,
                    details TEXT,
                    window_id INTEGER,
                    anomalous INTEGER,
                    anomaly_score REAL
                );

                CREATE INDEX IF NOT EXISTS idx_events_timestamp
                    ON events(timestamp_ms);
                CREATE INDEX IF NOT EXISTS idx_events_category
                    ON events(category);

                CREATE TABLE IF NOT EXISTS meta (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );
                INSERT OR IGNORE INTO meta (key, value)
                    VALUES ('schema_version', '{SCHEMA_VERSION}');
                "#
            ))
            .map_err(|e| StoreError::Schema(e.to_string()))
    }

    /// 기록된 스키마 버전을 반환합니다.
    pub fn schema_version(&self) -> Result<Option<String>, StoreError> {
        self.conn()
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Query(other.to_string())),
            })
    }

    /// 이벤트를 저장하고 부여된 id를 반환합니다.
    ///
    /// 각 insert는 독립적이며, `details`는 컴팩트 JSON 텍스트로
    /// 직렬화됩니다. 빈 `details`는 NULL로 저장됩니다.
    pub fn insert(&self, event: &Event) -> Result<i64, StoreError> {
        let details = if event.details.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&event.details)
                    .map_err(|e| StoreError::Insert(e.to_string()))?,
            )
        };

        let conn = self.conn();
        conn.execute(
            "INSERT INTO events \
             (timestamp_ms, category, severity, label, details, window_id, anomalous, anomaly_score) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.timestamp.timestamp_millis(),
                event.category.as_str(),
                event.severity.as_str(),
                event.label,
                details,
                event.window_id,
                event.anomalous,
                event.anomaly_score,
            ],
        )
        .map_err(|e| StoreError::Insert(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    /// 시각 범위(양끝 포함) + 카테고리 필터 쿼리.
    ///
    /// `categories`가 비어 있으면 전체 카테고리를 포함하고, 비어 있지
    /// 않으면 SQL `IN` 필터로 동작합니다. 결과는 `timestamp_ms` 오름차순
    /// (동률이면 id 오름차순)입니다.
    pub fn query_range(
        &self,
        from_ms: i64,
        to_ms: i64,
        categories: &[Category],
    ) -> Result<Vec<Event>, StoreError> {
        let mut sql = String::from(
            "SELECT id, timestamp_ms, category, severity, label, details, \
             window_id, anomalous, anomaly_score \
             FROM events WHERE timestamp_ms BETWEEN ?1 AND ?2",
        );
        let mut bind: Vec<SqlValue> = vec![SqlValue::from(from_ms), SqlValue::from(to_ms)];

        if !categories.is_empty() {
            let placeholders: Vec<String> = (0..categories.len())
                .map(|i| format!("?{}", i + 3))
                .collect();
            sql.push_str(&format!(" AND category IN ({})", placeholders.join(", ")));
            bind.extend(
                categories
                    .iter()
                    .map(|category| SqlValue::from(category.as_str().to_owned())),
            );
        }
        sql.push_str(" ORDER BY timestamp_ms ASC, id ASC");

        let conn = self.conn();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(bind), row_to_event)
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row.map_err(|e| StoreError::Query(e.to_string()))?);
        }
        Ok(events)
    }

    // 포이즌된 잠금은 내부 값을 그대로 회수해 계속 사용
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 행을 이벤트로 복원합니다.
///
/// 알 수 없는 카테고리/심각도 텍스트는 읽기 경로 폴백
/// (`System`/`Info`)을 적용하고, 깨진 details JSON은 빈 맵이 됩니다.
fn row_to_event(row: &rusqlite::Row<'_>) -> Result<Event, rusqlite::Error> {
    let id: i64 = row.get(0)?;
    let timestamp_ms: i64 = row.get(1)?;
    let category: String = row.get(2)?;
    let severity: String = row.get(3)?;
    let label: String = row.get(4)?;
    let details_text: Option<String> = row.get(5)?;
    let window_id: Option<i64> = row.get(6)?;
    let anomalous: Option<bool> = row.get(7)?;
    let anomaly_score: Option<f64> = row.get(8)?;

    let details = details_text
        .as_deref()
        .and_then(|text| match serde_json::from_str::<Map<String, Value>>(text) {
            Ok(map) => Some(map),
            Err(e) => {
                debug!(error = %e, id, "stored details is not a JSON object");
                None
            }
        })
        .unwrap_or_default();

    let timestamp = Utc
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .unwrap_or_default();

    Ok(Event {
        id,
        timestamp,
        category: Category::from_str_loose(&category).unwrap_or_default(),
        severity: Severity::from_str_loose(&severity).unwrap_or_default(),
        label,
        details,
        window_id,
        anomalous,
        anomaly_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn event_at(category: Category, offset_ms: i64) -> Event {
        let base = Utc.timestamp_millis_opt(1_750_000_000_000).single().unwrap();
        let mut event = Event::new(category, Severity::Warning, "test event");
        event.timestamp = base + TimeDelta::milliseconds(offset_ms);
        event
    }

    #[test]
    fn insert_assigns_monotonic_ids() {
        let store = EventStore::open_in_memory().unwrap();
        let first = store.insert(&event_at(Category::Gpu, 0)).unwrap();
        let second = store.insert(&event_at(Category::Gpu, 1)).unwrap();
        assert!(second > first);
    }

    #[test]
    fn schema_init_is_idempotent() {
        let store = EventStore::open_in_memory().unwrap();
        store.init_schema().unwrap();
        store.init_schema().unwrap();
        assert_eq!(store.schema_version().unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn query_orders_by_timestamp_regardless_of_arrival() {
        let store = EventStore::open_in_memory().unwrap();
        // 도착 순서 t2, t1, t3
        store.insert(&event_at(Category::System, 200)).unwrap();
        store.insert(&event_at(Category::System, 100)).unwrap();
        store.insert(&event_at(Category::System, 300)).unwrap();

        let base = 1_750_000_000_000;
        let events = store.query_range(base, base + 1000, &[]).unwrap();
        let offsets: Vec<i64> = events
            .iter()
            .map(|e| e.timestamp.timestamp_millis() - base)
            .collect();
        assert_eq!(offsets, vec![100, 200, 300]);
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let store = EventStore::open_in_memory().unwrap();
        store.insert(&event_at(Category::System, 0)).unwrap();
        store.insert(&event_at(Category::System, 500)).unwrap();
        store.insert(&event_at(Category::System, 1000)).unwrap();

        let base = 1_750_000_000_000;
        let events = store.query_range(base, base + 1000, &[]).unwrap();
        assert_eq!(events.len(), 3);

        let inner = store.query_range(base + 1, base + 999, &[]).unwrap();
        assert_eq!(inner.len(), 1);
    }

    #[test]
    fn category_filter_is_an_in_filter() {
        let store = EventStore::open_in_memory().unwrap();
        store.insert(&event_at(Category::Gpu, 0)).unwrap();
        store.insert(&event_at(Category::Thermal, 1)).unwrap();
        store.insert(&event_at(Category::System, 2)).unwrap();
        store.insert(&event_at(Category::Gpu, 3)).unwrap();

        let base = 1_750_000_000_000;
        let gpu_only = store
            .query_range(base, base + 10, &[Category::Gpu])
            .unwrap();
        assert_eq!(gpu_only.len(), 2);
        assert!(gpu_only.iter().all(|e| e.category == Category::Gpu));

        let two = store
            .query_range(base, base + 10, &[Category::Gpu, Category::Thermal])
            .unwrap();
        assert_eq!(two.len(), 3);
    }

    #[test]
    fn details_round_trip_through_storage() {
        let store = EventStore::open_in_memory().unwrap();
        let mut event = event_at(Category::Process, 0);
        event
            .details
            .insert("message".to_owned(), Value::from("raw line"));
        event
            .details
            .insert("loadavg_1min".to_owned(), Value::from(7.5));
        let id = store.insert(&event).unwrap();

        let base = 1_750_000_000_000;
        let stored = store.query_range(base, base, &[]).unwrap();
        assert_eq!(stored[0].id, id);
        assert_eq!(stored[0].details["message"], Value::from("raw line"));
        assert_eq!(stored[0].details["loadavg_1min"], Value::from(7.5));
    }

    #[test]
    fn empty_details_stored_as_null_and_read_as_empty() {
        let store = EventStore::open_in_memory().unwrap();
        store.insert(&event_at(Category::System, 0)).unwrap();

        let base = 1_750_000_000_000;
        let stored = store.query_range(base, base, &[]).unwrap();
        assert!(stored[0].details.is_empty());
        assert!(stored[0].window_id.is_none());
        assert!(stored[0].anomalous.is_none());
        assert!(stored[0].anomaly_score.is_none());
    }

    #[test]
    fn anomaly_fields_round_trip() {
        let store = EventStore::open_in_memory().unwrap();
        let mut event = event_at(Category::Gpu, 0);
        event.anomalous = Some(true);
        event.anomaly_score = Some(23.0);
        store.insert(&event).unwrap();

        let base = 1_750_000_000_000;
        let stored = store.query_range(base, base, &[]).unwrap();
        assert_eq!(stored[0].anomalous, Some(true));
        assert_eq!(stored[0].anomaly_score, Some(23.0));
    }

    #[test]
    fn unknown_category_text_falls_back_to_system() {
        let store = EventStore::open_in_memory().unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO events (timestamp_ms, category, severity, label) \
                 VALUES (1750000000000, 'quantum', 'shouting', 'future row')",
                [],
            )
            .unwrap();

        let stored = store
            .query_range(1_750_000_000_000, 1_750_000_000_000, &[])
            .unwrap();
        assert_eq!(stored[0].category, Category::System);
        assert_eq!(stored[0].severity, Severity::Info);
    }

    #[test]
    fn open_on_disk_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");

        {
            let store = EventStore::open(&path).unwrap();
            store.insert(&event_at(Category::Gpu, 0)).unwrap();
        }

        let reopened = EventStore::open(&path).unwrap();
        let base = 1_750_000_000_000;
        let stored = reopened.query_range(base, base, &[]).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].category, Category::Gpu);
    }

    #[test]
    fn open_unwritable_path_is_an_open_error() {
        let result = EventStore::open("/nonexistent-dir/sub/events.db");
        assert!(matches!(result, Err(StoreError::Open(_))));
    }

    #[test]
    fn insert_into_broken_store_is_an_insert_error() {
        let store = EventStore::open_in_memory().unwrap();
        store.conn().execute_batch("DROP TABLE events").unwrap();

        let result = store.insert(&event_at(Category::Gpu, 0));
        assert!(matches!(result, Err(StoreError::Insert(_))));
    }

    #[test]
    fn query_against_broken_store_is_a_query_error() {
        let store = EventStore::open_in_memory().unwrap();
        store.conn().execute_batch("DROP TABLE events").unwrap();

        let result = store.query_range(0, i64::MAX, &[]);
        assert!(matches!(result, Err(StoreError::Query(_))));
    }
}
