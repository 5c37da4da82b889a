//! 이벤트 데이터 모델 — 파이프라인 전체를 흐르는 표준 레코드
//!
//! [`Event`]는 분류 파이프라인, 이벤트 스토어, 구독자 배포 레이어가
//! 공유하는 유일한 레코드 형식입니다. JSON 와이어 형식은
//! [`Event::to_json`] / [`Event::from_json`]으로 고정됩니다.

use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value};

/// 저장 이벤트 라벨의 최대 길이 (문자 수)
pub const MAX_LABEL_LEN: usize = 120;

/// 이벤트 카테고리 — 발생 서브시스템 축
///
/// 닫힌 열거형입니다. 알 수 없는 문자열은 읽기 경로에서
/// [`Category::System`]으로 폴백됩니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    /// 일반 시스템 이벤트 (폴백 포함)
    #[default]
    System,
    /// GPU 행/리셋
    Gpu,
    /// 열 스로틀링
    Thermal,
    /// 프로세스 리소스 사용
    Process,
    /// 패키지/시스템 업데이트
    Update,
    /// 네트워크 (레이트 리밋 등)
    Network,
    /// 분류 불가
    Unknown,
}

impl Category {
    /// 와이어 형식에 사용하는 소문자 문자열을 반환합니다.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Gpu => "gpu",
            Self::Thermal => "thermal",
            Self::Process => "process",
            Self::Update => "update",
            Self::Network => "network",
            Self::Unknown => "unknown",
        }
    }

    /// 문자열에서 카테고리를 파싱합니다.
    ///
    /// 대소문자와 앞뒤 공백을 무시합니다. 인식되지 않으면 `None`을
    /// 반환하며, 호출자가 `System` 폴백을 적용합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "system" => Some(Self::System),
            "gpu" => Some(Self::Gpu),
            "thermal" => Some(Self::Thermal),
            "process" => Some(Self::Process),
            "update" => Some(Self::Update),
            "network" => Some(Self::Network),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 이벤트 심각도
///
/// `Ord` 구현으로 심각도 비교가 가능합니다
/// (`Info < Warning < Error < Critical`). "집합 중 최악 심각도"
/// 계산에 이 순서를 사용합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// 정보성 이벤트
    #[default]
    Info,
    /// 경고
    Warning,
    /// 오류
    Error,
    /// 치명적 — 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 와이어 형식에 사용하는 소문자 문자열을 반환합니다.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다. 인식되지 않으면 `None`을 반환하며,
    /// 호출자가 `Info` 폴백을 적용합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "warning" | "warn" => Some(Self::Warning),
            "error" | "err" => Some(Self::Error),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 시스템 이벤트 — 파이프라인의 표준 레코드
///
/// `id`는 스토어가 부여하는 단조 증가 식별자로, 저장 전에는 0입니다.
/// 내용이 같아도 `id`가 다르면 서로 다른 레코드입니다 (스토어 레이어
/// 중복 제거 없음).
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// 스토어 부여 식별자 (저장 전 0)
    pub id: i64,
    /// 이벤트 시각 — 읽기 경로에서 항상 UTC
    pub timestamp: DateTime<Utc>,
    /// 카테고리
    pub category: Category,
    /// 심각도
    pub severity: Severity,
    /// 짧은 요약 (저장 이벤트에서 비어 있지 않음)
    pub label: String,
    /// 부가 필드 (원시 메시지, 유닛명, 수치 등) — 스토어는 구조를
    /// 해석하지 않고 직렬화된 텍스트로만 다룹니다
    pub details: Map<String, Value>,
    /// 향후 집계 그룹 참조 (현재 생산자 없음, 저장/와이어 왕복만 보장)
    pub window_id: Option<i64>,
    /// 베이스라인 트래커 판정 (설정된 경우)
    pub anomalous: Option<bool>,
    /// 베이스라인 점수 — 0 이상, 0은 "특이하지 않음"
    pub anomaly_score: Option<f64>,
}

impl Event {
    /// 현재 시각(UTC)으로 새 이벤트를 생성합니다.
    pub fn new(category: Category, severity: Severity, label: impl Into<String>) -> Self {
        Self {
            id: 0,
            timestamp: Utc::now(),
            category,
            severity,
            label: label.into(),
            details: Map::new(),
            window_id: None,
            anomalous: None,
            anomaly_score: None,
        }
    }

    /// 와이어 형식 JSON 객체로 직렬화합니다.
    ///
    /// `id`가 0이면 생략합니다. `timestamp`는 ISO-8601 문자열과
    /// `timestamp_ms` (UTC epoch 밀리초) 두 형태로 모두 내보냅니다.
    /// 빈 `details`와 미설정 옵션 필드는 생략합니다.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();

        if self.id != 0 {
            obj.insert("id".to_owned(), Value::from(self.id));
        }

        obj.insert(
            "timestamp".to_owned(),
            Value::from(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        obj.insert(
            "timestamp_ms".to_owned(),
            Value::from(self.timestamp.timestamp_millis()),
        );

        obj.insert("category".to_owned(), Value::from(self.category.as_str()));
        obj.insert("severity".to_owned(), Value::from(self.severity.as_str()));
        obj.insert("label".to_owned(), Value::from(self.label.clone()));

        if !self.details.is_empty() {
            obj.insert("details".to_owned(), Value::Object(self.details.clone()));
        }

        if let Some(anomalous) = self.anomalous {
            obj.insert("anomalous".to_owned(), Value::from(anomalous));
        }
        if let Some(score) = self.anomaly_score {
            obj.insert("anomaly_score".to_owned(), Value::from(score));
        }
        if let Some(window_id) = self.window_id {
            obj.insert("window_id".to_owned(), Value::from(window_id));
        }

        Value::Object(obj)
    }

    /// 와이어 형식 JSON 객체에서 이벤트를 복원합니다.
    ///
    /// `timestamp_ms`를 우선하고, 없으면 ISO 문자열을 파싱합니다.
    /// 둘 다 없거나 유효하지 않으면 현재 시각을 대입합니다.
    /// 인식되지 않는 category/severity는 `System`/`Info`로 폴백됩니다.
    pub fn from_json(obj: &Map<String, Value>) -> Self {
        let id = obj.get("id").and_then(Value::as_i64).unwrap_or(0);

        let timestamp = obj
            .get("timestamp_ms")
            .and_then(Value::as_i64)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .or_else(|| {
                obj.get("timestamp")
                    .and_then(Value::as_str)
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
            })
            .unwrap_or_else(Utc::now);

        let category = obj
            .get("category")
            .and_then(Value::as_str)
            .and_then(Category::from_str_loose)
            .unwrap_or_default();

        let severity = obj
            .get("severity")
            .and_then(Value::as_str)
            .and_then(Severity::from_str_loose)
            .unwrap_or_default();

        let label = obj
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        let details = obj
            .get("details")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Self {
            id,
            timestamp,
            category,
            severity,
            label,
            details,
            window_id: obj.get("window_id").and_then(Value::as_i64),
            anomalous: obj.get("anomalous").and_then(Value::as_bool),
            anomaly_score: obj.get("anomaly_score").and_then(Value::as_f64),
        }
    }

    /// 컴팩트 JSON 문자열로 직렬화합니다 (구독자 알림 형식).
    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }

    /// JSON 문자열에서 이벤트를 복원합니다.
    ///
    /// 객체가 아닌 입력은 `None`을 반환합니다.
    pub fn from_json_string(json: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(json).ok()?;
        value.as_object().map(Self::from_json)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}/{} {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.category,
            self.severity,
            self.label,
        )
    }
}

/// 원시 메시지를 라벨 길이 제한에 맞게 자릅니다.
///
/// 문자 경계 기준으로 자르며, 빈 입력은 `"(no message)"`로 대체해
/// 저장 이벤트의 라벨이 비지 않도록 합니다.
pub fn truncate_label(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "(no message)".to_owned();
    }
    if trimmed.chars().count() <= MAX_LABEL_LEN {
        trimmed.to_owned()
    } else {
        trimmed.chars().take(MAX_LABEL_LEN).collect()
    }
}
