//! 메시지 분류기 -- 순수 규칙 기반 패턴 인식
//!
//! [`Classifier`]는 원시 로그 메시지를 (카테고리, 심각도, 레이블)로
//! 매핑합니다. 규칙은 순서가 있는 목록이며 첫 매치가 이깁니다.
//! I/O와 공유 상태가 없어 단독으로 완전히 테스트할 수 있습니다.
//!
//! 자원 사용 요약 라인(systemd `Consumed ...` 패턴)은 매치되더라도
//! cpu/메모리 수치가 임계값 아래면 의도적으로 억제합니다 — 규칙 누락이
//! 아니라 노이즈 필터입니다.

use regex::Regex;

use watchpost_core::error::PipelineError;
use watchpost_core::types::{Category, Severity};

/// 자원 사용 억제 임계값: CPU 시간 (초)
const ACCOUNTING_CPU_THRESHOLD: f64 = 5.0;
/// 자원 사용 억제 임계값: 메모리 피크 (MB)
const ACCOUNTING_MEM_THRESHOLD: f64 = 1024.0;

/// systemd 자원 사용 요약 라인 패턴 (소문자화된 메시지에 적용)
const ACCOUNTING_PATTERN: &str = r"consumed ([0-9]+(?:\.[0-9]+)?)s cpu time over ([0-9]+(?:\.[0-9]+)?)s wall clock time, ([0-9]+(?:\.[0-9]+)?)m memory peak\.";

/// GPU 관련 용어
const GPU_TERMS: &[&str] = &["gpu", "amdgpu", "nvidia"];
/// GPU 장애 용어 (GPU 용어와 동시 등장해야 매치)
const GPU_FAILURE_TERMS: &[&str] = &["hang", "reset", "fault", "timeout"];
/// 레이트 리밋 문구 ("429"와 동시 등장해야 매치)
const RATE_LIMIT_TERMS: &[&str] = &["rate limit", "rate-limit", "ratelimit"];
/// 서멀 용어
const THERMAL_TERMS: &[&str] = &["thermal", "throttl", "temperature above threshold"];
/// OOM 용어
const OOM_TERMS: &[&str] = &["oom-killer", "out of memory"];

/// 분류 결과
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// 이벤트 카테고리
    pub category: Category,
    /// 이벤트 심각도
    pub severity: Severity,
    /// 사람이 읽을 수 있는 요약
    pub label: &'static str,
}

/// 규칙 기반 메시지 분류기
///
/// 자원 사용 패턴 정규식은 생성 시 한 번만 컴파일합니다.
pub struct Classifier {
    accounting: Regex,
}

impl Classifier {
    /// 새 분류기를 생성합니다.
    pub fn new() -> Result<Self, PipelineError> {
        let accounting =
            Regex::new(ACCOUNTING_PATTERN).map_err(|e| PipelineError::Pattern(e.to_string()))?;
        Ok(Self { accounting })
    }

    /// 메시지를 분류합니다.
    ///
    /// 순서 있는 규칙 목록을 소문자화된 메시지에 적용하며 첫 매치가
    /// 이깁니다. 어떤 규칙도 매치되지 않으면 (또는 자원 사용 라인이
    /// 임계값 아래라 억제되면) `None`을 반환하고, 폴백 처리는 호출자
    /// 몫입니다.
    pub fn classify(&self, message: &str) -> Option<Classification> {
        let lower = message.to_lowercase();

        // 1. HTTP 429 / 레이트 리밋
        // 숫자 429 단독은 오탐 위험이 있어 "http 429" 또는 레이트 리밋
        // 문구와의 동시 등장만 인정함
        if lower.contains("too many requests")
            || lower.contains("http 429")
            || (lower.contains("429") && contains_any(&lower, RATE_LIMIT_TERMS))
        {
            return Some(Classification {
                category: Category::Network,
                severity: Severity::Warning,
                label: "HTTP 429 (rate limited)",
            });
        }

        // 2. GPU 용어 + 장애 용어 동시 등장
        if contains_any(&lower, GPU_TERMS) && contains_any(&lower, GPU_FAILURE_TERMS) {
            return Some(Classification {
                category: Category::Gpu,
                severity: Severity::Error,
                label: "GPU hang/reset",
            });
        }

        // 3. 서멀 스로틀링
        if contains_any(&lower, THERMAL_TERMS) {
            return Some(Classification {
                category: Category::Thermal,
                severity: Severity::Warning,
                label: "Thermal throttling",
            });
        }

        // 4. OOM
        if contains_any(&lower, OOM_TERMS) {
            return Some(Classification {
                category: Category::System,
                severity: Severity::Critical,
                label: "Out-of-memory condition",
            });
        }

        // 5. soft lockup
        if lower.contains("soft lockup") {
            return Some(Classification {
                category: Category::System,
                severity: Severity::Error,
                label: "CPU soft lockup",
            });
        }

        // 6. systemd 자원 사용 요약 라인 (임계값 아래면 억제)
        if let Some(caps) = self.accounting.captures(&lower) {
            let cpu: f64 = caps.get(1)?.as_str().parse().ok()?;
            let mem: f64 = caps.get(3)?.as_str().parse().ok()?;
            if cpu >= ACCOUNTING_CPU_THRESHOLD || mem >= ACCOUNTING_MEM_THRESHOLD {
                return Some(Classification {
                    category: Category::Process,
                    severity: Severity::Warning,
                    label: "High resource usage (systemd)",
                });
            }
            return None;
        }

        // 7. 매치 없음
        None
    }
}

/// syslog 우선순위(0-7, 낮을수록 심각)를 심각도로 매핑합니다.
///
/// 내용 규칙에 전부 실패한 레코드의 폴백 심각도로 사용됩니다.
pub fn severity_from_priority(priority: u8) -> Severity {
    match priority {
        0..=2 => Severity::Critical,
        3 => Severity::Error,
        4 => Severity::Warning,
        _ => Severity::Info,
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
