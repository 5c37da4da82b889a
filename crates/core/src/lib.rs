#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//! - [`types`]: 이벤트 데이터 모델 ([`Event`], [`Category`], [`Severity`])과 JSON 와이어 형식
//! - [`source`]: 로그 소스 capability trait ([`LogSource`])과 원시 레코드 타입
//! - [`error`]: 도메인 에러 타입
//! - [`config`]: watchpost.toml 설정
//! - [`metrics`]: `metrics` 파사드 이름 상수

pub mod config;
pub mod error;
pub mod metrics;
pub mod source;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, PipelineError, SourceError, StoreError, WatchpostError};

// 설정
pub use config::WatchpostConfig;

// 이벤트
pub use types::{Category, Event, Severity};

// 소스
pub use source::{BoxFuture, IngestMessage, LogSource, RawRecord, SourceState};
