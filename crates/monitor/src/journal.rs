//! 커서 기반 저널 폴링 리더
//!
//! [`JournalPoller`]는 기동 시 저널 테일의 커서를 잡고 (히스토리를
//! 재생하지 않음), 고정 주기 tick마다 `journalctl --after-cursor`
//! 배치 호출로 새로 도착한 엔트리를 커서 순서대로 드레인합니다.
//! 블로킹은 poll tick 안에서만 일어나며, 엔트리 단위가 아니라 주기
//! 타이머가 중단 경계입니다.
//!
//! 엔트리별로 `MESSAGE`, `PRIORITY`, `_SYSTEMD_UNIT`,
//! `SYSLOG_IDENTIFIER`, `__REALTIME_TIMESTAMP`(µs)를 읽어
//! [`RawRecord`]로 변환합니다. 형식이 깨진 엔트리는 debug 레벨로
//! 건너뛰고 스트림은 계속됩니다.

use std::process::Stdio;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use watchpost_core::error::{SourceError, WatchpostError};
use watchpost_core::source::{BoxFuture, IngestMessage, LogSource, RawRecord, SourceState};

const SOURCE_NAME: &str = "journal-poller";

/// 커서 기반 저널 배치 폴링 리더
pub struct JournalPoller {
    journalctl_path: String,
    poll_interval: Duration,
    tx: mpsc::Sender<IngestMessage>,
    state: watch::Sender<SourceState>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl JournalPoller {
    /// 새 폴러를 생성합니다.
    pub fn new(
        journalctl_path: impl Into<String>,
        poll_interval: Duration,
        tx: mpsc::Sender<IngestMessage>,
    ) -> Self {
        let (state, _) = watch::channel(SourceState::Stopped);
        Self {
            journalctl_path: journalctl_path.into(),
            poll_interval,
            tx,
            state,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }
}

impl LogSource for JournalPoller {
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

            // journalctl 부재는 기동 실패 — tick마다 경고만 반복하지 않음
            if let Err(e) = probe_journalctl(&self.journalctl_path).await {
                self.state.send_replace(SourceState::Failed);
                return Err(SourceError::Spawn {
                    source_name: SOURCE_NAME.to_owned(),
                    reason: e.to_string(),
                }
                .into());
            }

            self.cancel = CancellationToken::new();
            let cancel = self.cancel.clone();
            let tx = self.tx.clone();
            let state = self.state.clone();
            let path = self.journalctl_path.clone();
            let poll_interval = self.poll_interval;

            self.state.send_replace(SourceState::Running);
            self.handle = Some(tokio::spawn(async move {
                // 테일 탐색: 마지막 엔트리의 커서만 잡고 내용은 버림
                let mut cursor = seed_cursor(&path).await;

                let mut ticker = time::interval(poll_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker.tick().await;

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            if cursor.is_none() {
                                // 빈 저널: 엔트리가 생길 때까지 테일 탐색 재시도
                                cursor = seed_cursor(&path).await;
                                continue;
                            }
                            if !drain_new_entries(&path, &mut cursor, &tx).await {
                                debug!("ingest channel closed, stopping journal poller");
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

/// journalctl 바이너리가 실행 가능한지 확인합니다.
///
/// 실행 자체가 불가능한 경우(바이너리 없음, 권한 없음)만 실패로
/// 봅니다. 실행은 되지만 호출이 실패하는 경우는 tick 단위로 격리되는
/// 일시 장애로 취급합니다.
async fn probe_journalctl(journalctl_path: &str) -> std::io::Result<()> {
    Command::new(journalctl_path)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|_| ())
}

/// 저널 마지막 엔트리의 커서를 읽습니다 (없으면 `None`).
async fn seed_cursor(journalctl_path: &str) -> Option<String> {
    let output = Command::new(journalctl_path)
        .args(["-o", "json", "-n", "1", "-q"])
        .stdin(Stdio::null())
        .output()
        .await;

    let output = match output {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            warn!(code = ?output.status.code(), "journalctl tail seek failed");
            return None;
        }
        Err(e) => {
            warn!(error = %e, "failed to run journalctl for tail seek");
            return None;
        }
    };

    for line in output.stdout.split(|&b| b == b'\n').rev() {
        if line.is_empty() {
            continue;
        }
        match serde_json::from_slice::<Value>(line) {
            Ok(entry) => {
                if let Some(cursor) = entry.get("__CURSOR").and_then(Value::as_str) {
                    return Some(cursor.to_owned());
                }
            }
            Err(e) => debug!(error = %e, "skipping malformed journal entry during tail seek"),
        }
    }
    None
}

/// 커서 이후의 엔트리를 전부 드레인합니다.
///
/// 인제스트 채널이 닫혔으면 `false`를 반환합니다. 호출 실패나 깨진
/// 엔트리는 레코드 단위로 격리됩니다.
async fn drain_new_entries(
    journalctl_path: &str,
    cursor: &mut Option<String>,
    tx: &mpsc::Sender<IngestMessage>,
) -> bool {
    let Some(current) = cursor.clone() else {
        return true;
    };

    let output = Command::new(journalctl_path)
        .args(["-o", "json", "-q", "--after-cursor", &current])
        .stdin(Stdio::null())
        .output()
        .await;

    let output = match output {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            warn!(code = ?output.status.code(), "journalctl batch drain failed");
            return true;
        }
        Err(e) => {
            warn!(error = %e, "failed to run journalctl for batch drain");
            return true;
        }
    };

    for line in output.stdout.split(|&b| b == b'\n') {
        if line.is_empty() {
            continue;
        }
        let entry = match serde_json::from_slice::<Value>(line) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "skipping malformed journal entry");
                continue;
            }
        };

        // 커서는 레코드 전달 여부와 무관하게 전진 (동일 엔트리 중복 방지)
        if let Some(next) = entry.get("__CURSOR").and_then(Value::as_str) {
            *cursor = Some(next.to_owned());
        }

        let Some(record) = entry_to_record(&entry) else {
            debug!("skipping journal entry without usable MESSAGE");
            continue;
        };
        if tx.send(IngestMessage::Raw(record)).await.is_err() {
            return false;
        }
    }
    true
}

/// 저널 JSON 엔트리를 [`RawRecord`]로 변환합니다.
///
/// `MESSAGE`가 문자열이 아니면 (바이너리 페이로드는 배열로 직렬화됨)
/// `None`을 반환합니다.
pub(crate) fn entry_to_record(entry: &Value) -> Option<RawRecord> {
    let message = entry.get("MESSAGE")?.as_str()?.to_owned();

    let priority = entry.get("PRIORITY").and_then(field_as_u8);
    let unit = entry
        .get("_SYSTEMD_UNIT")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let identifier = entry
        .get("SYSLOG_IDENTIFIER")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let timestamp = entry
        .get("__REALTIME_TIMESTAMP")
        .and_then(field_as_u64)
        .and_then(|usec| Utc.timestamp_millis_opt((usec / 1000) as i64).single());

    Some(RawRecord {
        message,
        priority,
        unit,
        identifier,
        timestamp,
    })
}

// 저널 JSON은 수치 필드를 문자열로 내보내는 경우가 많음
fn field_as_u8(value: &Value) -> Option<u8> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
        _ => None,
    }
}

fn field_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}
