//! 시스템 부하 샘플러 -- /proc/loadavg 주기 관측
//!
//! [`LoadSampler`]는 고정 주기로 `/proc/loadavg`를 읽어 1분 load
//! average가 임계값을 넘으면 사전 분류된 `Process`/`Warning` 이벤트를
//! 인제스트 채널로 보냅니다. 분류기를 거치지 않는 생산자이므로
//! [`IngestMessage::Event`]를 사용합니다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use watchpost_core::error::{SourceError, WatchpostError};
use watchpost_core::source::{BoxFuture, IngestMessage, LogSource, SourceState};
use watchpost_core::types::{Category, Event, Severity};

const SOURCE_NAME: &str = "load-sampler";

/// /proc/loadavg 주기 샘플러
pub struct LoadSampler {
    interval: Duration,
    threshold: f64,
    loadavg_path: PathBuf,
    tx: mpsc::Sender<IngestMessage>,
    state: watch::Sender<SourceState>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl LoadSampler {
    /// 새 샘플러를 생성합니다.
    pub fn new(interval: Duration, threshold: f64, tx: mpsc::Sender<IngestMessage>) -> Self {
        let (state, _) = watch::channel(SourceState::Stopped);
        Self {
            interval,
            threshold,
            loadavg_path: PathBuf::from("/proc/loadavg"),
            tx,
            state,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    /// loadavg 파일 경로를 바꿉니다 (테스트용).
    pub fn with_loadavg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.loadavg_path = path.into();
        self
    }
}

impl LogSource for LoadSampler {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn state(&self) -> SourceState {
        *self.state.borrow()
    }

    fn start(&mut self) -> BoxFuture<'_, Result<(), WatchpostError>> {
        Box::pin(async move {
            if self.state() == SourceState::Running {
                return Err(SourceError::AlreadyRunning(SOURCE_NAME.to_owned()).into());
            }
            self.state.send_replace(SourceState::Starting);

            self.cancel = CancellationToken::new();
            let cancel = self.cancel.clone();
            let tx = self.tx.clone();
            let state = self.state.clone();
            let path = self.loadavg_path.clone();
            let interval = self.interval;
            let threshold = self.threshold;

            self.state.send_replace(SourceState::Running);
            self.handle = Some(tokio::spawn(async move {
                let mut ticker = time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // interval의 첫 tick은 즉시 발화하므로 건너뜀
                ticker.tick().await;

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            if let Some(event) = sample(&path, threshold).await
                                && tx.send(IngestMessage::Event(event)).await.is_err()
                            {
                                debug!("ingest channel closed, stopping load sampler");
                                break;
                            }
                        }
                    }
                }
                state.send_replace(SourceState::Stopped);
            }));

            Ok(())
        })
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), WatchpostError>> {
        Box::pin(async move {
            if self.state() == SourceState::Stopped {
                return Err(SourceError::NotRunning(SOURCE_NAME.to_owned()).into());
            }
            self.cancel.cancel();
            if let Some(handle) = self.handle.take() {
                let _ = handle.await;
            }
            self.state.send_replace(SourceState::Stopped);
            Ok(())
        })
    }
}

/// loadavg 파일을 한 번 읽어 임계값 초과 시 이벤트를 만듭니다.
async fn sample(path: &Path, threshold: f64) -> Option<Event> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "failed to read loadavg");
            return None;
        }
    };

    let load = parse_loadavg(&content)?;
    if load <= threshold {
        return None;
    }

    let mut event = Event::new(Category::Process, Severity::Warning, "High CPU load");
    event
        .details
        .insert("loadavg_1min".to_owned(), Value::from(load));
    Some(event)
}

/// loadavg 첫 필드(1분 평균)를 파싱합니다.
fn parse_loadavg(content: &str) -> Option<f64> {
    content.split_whitespace().next()?.parse().ok()
}
