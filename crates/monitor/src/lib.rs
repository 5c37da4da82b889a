#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`classify`]: 순수 규칙 기반 분류기와 syslog 우선순위 → 심각도 매핑
//! - [`journal`]: 커서 기반 저널 배치 폴링 리더 ([`JournalPoller`])
//! - [`follow`]: journalctl 팔로우 서브프로세스 리더 ([`JournalFollower`])
//! - [`sampler`]: /proc/loadavg 주기 샘플러 ([`LoadSampler`])
//! - [`linebuf`]: 읽기 경계를 넘는 증분 라인 분리기 ([`LineBuffer`])
//! - [`baseline`]: 카테고리별 빈도 윈도우 추적기 ([`BaselineTracker`])
//!
//! # 아키텍처
//!
//! ```text
//! JournalPoller ─┐
//! JournalFollower ├─ IngestMessage ─> (daemon ingest: classify -> store -> publish)
//! LoadSampler   ─┘
//! ```
//!
//! 리더는 [`watchpost_core::LogSource`]를 구현하고 공유 mpsc 채널로
//! 레코드를 전달합니다. 분류와 저장은 데몬의 인제스트 태스크가 담당합니다.

pub mod baseline;
pub mod classify;
pub mod follow;
pub mod journal;
pub mod linebuf;
pub mod sampler;

// --- 주요 타입 re-export ---

// 분류기
pub use classify::{Classification, Classifier, severity_from_priority};

// 리더
pub use follow::JournalFollower;
pub use journal::JournalPoller;
pub use sampler::LoadSampler;

// 라인 버퍼
pub use linebuf::LineBuffer;

// 베이스라인
pub use baseline::BaselineTracker;
