//! 로그 소스 trait — 인제스트 파이프라인의 확장 포인트
//!
//! 모든 로그 소스(저널 폴러, journalctl follow 리더, 부하 샘플러)는
//! [`LogSource`]를 구현하고, 수집한 레코드를 공유 mpsc 채널에
//! [`IngestMessage`]로 밀어 넣습니다. 데몬은 소스를
//! `Box<dyn LogSource>`로 보관하므로 trait은 dyn-compatible하도록
//! [`BoxFuture`]를 반환합니다.
//!
//! # 생명주기
//! ```text
//! Stopped → start() → Starting → Running → stop() → Stopped
//!                                   └─ (내부 오류) → Failed
//! ```
//! `Failed`는 해당 소스 인스턴스에 대해서만 종결 상태입니다.
//! 데몬 전체는 계속 동작하며 저장된 이벤트 쿼리에 응답합니다.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::error::WatchpostError;
use crate::types::Event;

/// dyn-compatible trait 메서드가 반환하는 boxed future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 소스 생명주기 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// 정지됨 (초기 상태 포함)
    Stopped,
    /// 시작 중
    Starting,
    /// 실행 중
    Running,
    /// 오류로 중단됨 — 외부에서 재시작하기 전까지 종결
    Failed,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// 소스가 생산하는 원시 로그 레코드
///
/// 분류 전 단계의 중간 형식입니다. 타임스탬프가 없으면 인제스트
/// 파이프라인이 수신 시각을 대입합니다.
#[derive(Debug, Clone, Default)]
pub struct RawRecord {
    /// 원시 메시지 본문
    pub message: String,
    /// syslog 우선순위 (0-7, 낮을수록 심각)
    pub priority: Option<u8>,
    /// systemd 유닛명 (`_SYSTEMD_UNIT`)
    pub unit: Option<String>,
    /// syslog 식별자 (`SYSLOG_IDENTIFIER`)
    pub identifier: Option<String>,
    /// 소스가 제공한 시각 (UTC)
    pub timestamp: Option<DateTime<Utc>>,
}

/// 인제스트 채널 메시지
///
/// 로그 리더는 분류가 필요한 [`RawRecord`]를, 샘플러나 테스트 주입처럼
/// 이미 분류를 마친 생산자는 [`Event`]를 보냅니다. 사전 분류된
/// 이벤트는 게이팅 대상이 아닙니다.
#[derive(Debug, Clone)]
pub enum IngestMessage {
    /// 분류 파이프라인을 거칠 원시 레코드
    Raw(RawRecord),
    /// 분류를 우회하는 완성 이벤트 (타임스탬프 보정만 수행)
    Event(Event),
}

/// 로그 소스 capability trait
///
/// 두 리더 변형(저널 폴러, follow 서브프로세스)과 부하 샘플러가
/// 동일한 계약을 구현합니다. 새 소스를 추가할 때 데몬 코어를
/// 수정할 필요가 없습니다.
pub trait LogSource: Send + Sync {
    /// 소스 이름 (로깅/진단용)
    fn name(&self) -> &str;

    /// 현재 생명주기 상태
    fn state(&self) -> SourceState;

    /// 소스를 시작합니다.
    ///
    /// 저널 핸들/서브프로세스를 열고 수집 태스크를 스폰합니다.
    /// 실패 시 데몬은 경고를 남기고 해당 소스 없이 계속 동작합니다.
    fn start(&mut self) -> BoxFuture<'_, Result<(), WatchpostError>>;

    /// 소스를 정지합니다.
    ///
    /// 언제 호출해도 안전해야 하며, 소유한 서브프로세스/핸들을
    /// 즉시(제한 대기 후 강제 종료) 정리해야 합니다.
    fn stop(&mut self) -> BoxFuture<'_, Result<(), WatchpostError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_state_display() {
        assert_eq!(SourceState::Stopped.to_string(), "stopped");
        assert_eq!(SourceState::Running.to_string(), "running");
        assert_eq!(SourceState::Failed.to_string(), "failed");
    }

    #[test]
    fn raw_record_default_has_no_metadata() {
        let record = RawRecord::default();
        assert!(record.message.is_empty());
        assert!(record.priority.is_none());
        assert!(record.timestamp.is_none());
    }

    #[test]
    fn ingest_message_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<IngestMessage>();
        assert_send_sync::<RawRecord>();
    }
}
