//! 에러 타입 — 도메인별 에러 정의

/// Watchpost 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum WatchpostError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 이벤트 스토어 에러
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// 로그 소스 에러
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// 인제스트 파이프라인 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 이벤트 스토어 에러
///
/// open/schema 실패는 데몬 기동을 중단시키고, insert/query 실패는
/// 레코드 단위로 격리됩니다.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 데이터베이스 열기 실패
    #[error("failed to open database: {0}")]
    Open(String),

    /// 스키마 초기화 실패
    #[error("schema init failed: {0}")]
    Schema(String),

    /// 단일 이벤트 삽입 실패
    #[error("insert failed: {0}")]
    Insert(String),

    /// 범위 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),
}

/// 로그 소스 에러
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// 소스 시작 실패 (저널 접근 불가, 서브프로세스 없음 등)
    #[error("source '{source_name}' failed to start: {reason}")]
    Spawn { source_name: String, reason: String },

    /// 서브프로세스 비정상 종료
    #[error("source '{source_name}' child process exited (code: {code:?})")]
    Exited { source_name: String, code: Option<i32> },

    /// 이미 실행 중인 소스를 다시 시작하려 함
    #[error("source '{0}' is already running")]
    AlreadyRunning(String),

    /// 실행 중이 아닌 소스를 정지하려 함
    #[error("source '{0}' is not running")]
    NotRunning(String),
}

/// 인제스트 파이프라인 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 분류 규칙 패턴 컴파일 실패
    #[error("invalid classifier pattern: {0}")]
    Pattern(String),

    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 채널이 닫힘
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}
