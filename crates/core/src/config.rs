//! 설정 관리 — watchpost.toml 파싱 및 런타임 설정
//!
//! [`WatchpostConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`WATCHPOST_JOURNAL_MODE=poll` 형식)
//! 3. 설정 파일 (`watchpost.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), watchpost_core::error::WatchpostError> {
//! use watchpost_core::config::WatchpostConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = WatchpostConfig::load("watchpost.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = WatchpostConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, WatchpostError};

/// Watchpost 통합 설정
///
/// `watchpost.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchpostConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 저널 리더 설정
    #[serde(default)]
    pub journal: JournalConfig,
    /// 시스템 부하 샘플러 설정
    #[serde(default)]
    pub sampler: SamplerConfig,
    /// 이벤트 스토어 설정
    #[serde(default)]
    pub store: StoreConfig,
    /// 베이스라인 추적기 설정
    #[serde(default)]
    pub baseline: BaselineConfig,
}

impl WatchpostConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, WatchpostError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, WatchpostError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WatchpostError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                WatchpostError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, WatchpostError> {
        toml::from_str(toml_str).map_err(|e| {
            WatchpostError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `WATCHPOST_{SECTION}_{FIELD}`
    /// 예: `WATCHPOST_JOURNAL_MODE=poll`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "WATCHPOST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "WATCHPOST_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "WATCHPOST_GENERAL_DATA_DIR");
        override_string(&mut self.general.pid_file, "WATCHPOST_GENERAL_PID_FILE");

        // Journal
        override_bool(&mut self.journal.enabled, "WATCHPOST_JOURNAL_ENABLED");
        override_string(&mut self.journal.mode, "WATCHPOST_JOURNAL_MODE");
        override_string(
            &mut self.journal.journalctl_path,
            "WATCHPOST_JOURNAL_JOURNALCTL_PATH",
        );
        override_u64(
            &mut self.journal.poll_interval_secs,
            "WATCHPOST_JOURNAL_POLL_INTERVAL_SECS",
        );

        // Sampler
        override_bool(&mut self.sampler.enabled, "WATCHPOST_SAMPLER_ENABLED");
        override_u64(
            &mut self.sampler.interval_secs,
            "WATCHPOST_SAMPLER_INTERVAL_SECS",
        );
        override_f64(
            &mut self.sampler.load_threshold,
            "WATCHPOST_SAMPLER_LOAD_THRESHOLD",
        );

        // Store
        override_string(&mut self.store.path, "WATCHPOST_STORE_PATH");

        // Baseline
        override_f64(
            &mut self.baseline.anomaly_threshold,
            "WATCHPOST_BASELINE_ANOMALY_THRESHOLD",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), WatchpostError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        // journal.mode 검증
        if self.journal.enabled {
            let valid_modes = ["follow", "poll"];
            if !valid_modes.contains(&self.journal.mode.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "journal.mode".to_owned(),
                    reason: format!("must be one of: {}", valid_modes.join(", ")),
                }
                .into());
            }

            if self.journal.poll_interval_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "journal.poll_interval_secs".to_owned(),
                    reason: "must be greater than zero".to_owned(),
                }
                .into());
            }
        }

        // sampler 검증
        if self.sampler.enabled {
            if self.sampler.interval_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "sampler.interval_secs".to_owned(),
                    reason: "must be greater than zero".to_owned(),
                }
                .into());
            }

            if !self.sampler.load_threshold.is_finite() || self.sampler.load_threshold <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: "sampler.load_threshold".to_owned(),
                    reason: "must be a positive number".to_owned(),
                }
                .into());
            }
        }

        // baseline 검증 (0은 점수 부여 비활성화 의미)
        if !self.baseline.anomaly_threshold.is_finite() || self.baseline.anomaly_threshold < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "baseline.anomaly_threshold".to_owned(),
                reason: "must be zero or a positive number".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

// Default는 derive 매크로로 자동 생성 (각 필드가 Default를 구현하므로)

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
    /// PID 파일 경로
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/watchpost".to_owned(),
            pid_file: "/var/run/watchpost.pid".to_owned(),
        }
    }
}

/// 저널 리더 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 리더 변형 (follow: journalctl -f 서브프로세스, poll: 주기적 배치 드레인)
    pub mode: String,
    /// journalctl 실행 파일 경로
    pub journalctl_path: String,
    /// poll 모드 드레인 주기 (초)
    pub poll_interval_secs: u64,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: "follow".to_owned(),
            journalctl_path: "journalctl".to_owned(),
            poll_interval_secs: 1,
        }
    }
}

/// 시스템 부하 샘플러 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 샘플링 주기 (초)
    pub interval_secs: u64,
    /// 1분 load average 경보 임계값
    pub load_threshold: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 5,
            load_threshold: 4.0,
        }
    }
}

/// 이벤트 스토어 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite 데이터베이스 파일 경로
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "/var/lib/watchpost/events.db".to_owned(),
        }
    }
}

/// 베이스라인 추적기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// 이상 판정 점수 임계값 (0이면 점수 부여 비활성화)
    pub anomaly_threshold: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold: 20.0,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_f64(target: &mut f64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<f64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse f64 from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = WatchpostConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert!(config.journal.enabled);
        assert_eq!(config.journal.mode, "follow");
        assert!(config.sampler.enabled);
        assert_eq!(config.sampler.interval_secs, 5);
        assert_eq!(config.baseline.anomaly_threshold, 20.0);
    }

    #[test]
    fn default_config_passes_validation() {
        let config = WatchpostConfig::default();
        config.validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = WatchpostConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.store.path, "/var/lib/watchpost/events.db");
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[general]
log_level = "debug"

[journal]
mode = "poll"
poll_interval_secs = 2
"#;
        let config = WatchpostConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        // log_format은 기본값 유지
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.journal.mode, "poll");
        assert_eq!(config.journal.poll_interval_secs, 2);
    }

    #[test]
    fn from_str_full_toml() {
        let toml = r#"
[general]
log_level = "warn"
log_format = "pretty"
data_dir = "/opt/watchpost/data"
pid_file = "/opt/watchpost/watchpost.pid"

[journal]
enabled = true
mode = "poll"
journalctl_path = "/usr/bin/journalctl"
poll_interval_secs = 3

[sampler]
enabled = false
interval_secs = 10
load_threshold = 8.0

[store]
path = "/opt/watchpost/events.db"

[baseline]
anomaly_threshold = 35.0
"#;
        let config = WatchpostConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.journal.journalctl_path, "/usr/bin/journalctl");
        assert!(!config.sampler.enabled);
        assert_eq!(config.sampler.load_threshold, 8.0);
        assert_eq!(config.store.path, "/opt/watchpost/events.db");
        assert_eq!(config.baseline.anomaly_threshold, 35.0);
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let result = WatchpostConfig::parse("invalid = [[[toml");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            WatchpostError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = WatchpostConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = WatchpostConfig::default();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn validate_rejects_invalid_journal_mode_when_enabled() {
        let mut config = WatchpostConfig::default();
        config.journal.enabled = true;
        config.journal.mode = "stream".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("journal.mode"));
    }

    #[test]
    fn validate_accepts_invalid_journal_mode_when_disabled() {
        let mut config = WatchpostConfig::default();
        config.journal.enabled = false;
        config.journal.mode = "stream".to_owned();
        // journal이 비활성화 상태면 mode 검증을 건너뜀
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_zero_poll_interval() {
        let mut config = WatchpostConfig::default();
        config.journal.poll_interval_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("poll_interval_secs"));
    }

    #[test]
    fn validate_rejects_nonpositive_load_threshold() {
        let mut config = WatchpostConfig::default();
        config.sampler.load_threshold = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("load_threshold"));
    }

    #[test]
    fn validate_accepts_zero_anomaly_threshold() {
        let mut config = WatchpostConfig::default();
        config.baseline.anomaly_threshold = 0.0;
        // 0은 비활성화 의미로 허용
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_negative_anomaly_threshold() {
        let mut config = WatchpostConfig::default();
        config.baseline.anomaly_threshold = -1.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("anomaly_threshold"));
    }

    #[test]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_WATCHPOST_STR", "overridden") };
        override_string(&mut val, "TEST_WATCHPOST_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_WATCHPOST_STR") };
    }

    #[test]
    fn env_override_bool_invalid_keeps_original() {
        let mut val = false;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_WATCHPOST_BOOL_BAD", "not-a-bool") };
        override_bool(&mut val, "TEST_WATCHPOST_BOOL_BAD");
        assert!(!val); // 원래 값 유지
        unsafe { std::env::remove_var("TEST_WATCHPOST_BOOL_BAD") };
    }

    #[test]
    fn env_override_f64_valid() {
        let mut val = 4.0;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_WATCHPOST_F64", "7.5") };
        override_f64(&mut val, "TEST_WATCHPOST_F64");
        assert_eq!(val, 7.5);
        unsafe { std::env::remove_var("TEST_WATCHPOST_F64") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_WATCHPOST_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = WatchpostConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = WatchpostConfig::parse(&toml_str).unwrap();
        assert_eq!(config.general.log_level, parsed.general.log_level);
        assert_eq!(config.journal.mode, parsed.journal.mode);
        assert_eq!(config.baseline.anomaly_threshold, parsed.baseline.anomaly_threshold);
    }

    #[tokio::test]
    async fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchpost.toml");
        tokio::fs::write(&path, "[general]\nlog_level = \"debug\"\n")
            .await
            .unwrap();
        let config = WatchpostConfig::from_file(&path).await.unwrap();
        assert_eq!(config.general.log_level, "debug");
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let result = WatchpostConfig::from_file("/nonexistent/path/watchpost.toml").await;
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            WatchpostError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
