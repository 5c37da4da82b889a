//! 메트릭 이름 상수
//!
//! 핫 패스 계측에 쓰는 `metrics` 파사드 이름을 중앙에서 정의합니다.
//! 익스포터는 설치하지 않으며, 호스트 프로세스가 원하는 레코더를
//! 설치할 수 있습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `watchpost_`
//! - 접미어: `_total` (counter)

// ─── 인제스트 파이프라인 메트릭 ────────────────────────────────────

/// 인제스트: 수신한 전체 레코드 수 (counter)
pub const INGEST_RECORDS_TOTAL: &str = "watchpost_ingest_records_total";

/// 인제스트: 내용 규칙에 매치되어 분류된 레코드 수 (counter)
pub const INGEST_CLASSIFIED_TOTAL: &str = "watchpost_ingest_classified_total";

/// 인제스트: 게이팅 정책으로 버려진 레코드 수 (counter)
pub const INGEST_GATED_TOTAL: &str = "watchpost_ingest_gated_total";

/// 인제스트: insert 실패로 버려진 이벤트 수 (counter)
pub const INGEST_INSERT_FAILURES_TOTAL: &str = "watchpost_ingest_insert_failures_total";

// ─── 이벤트 버스 메트릭 ────────────────────────────────────────────

/// 버스: 구독자에게 전달된 알림 수 (counter)
pub const BUS_PUBLISHED_TOTAL: &str = "watchpost_bus_published_total";

/// 버스: 가득 찬 구독자 채널에서 버려진 알림 수 (counter)
pub const BUS_DROPPED_TOTAL: &str = "watchpost_bus_dropped_total";
