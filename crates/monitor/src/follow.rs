//! journalctl 팔로우 서브프로세스 리더
//!
//! [`JournalFollower`]는 `journalctl -f -o json -n 0`을 자식
//! 프로세스로 띄우고 stdout/stderr를 하나의 스트림처럼 소비합니다.
//! 바이트는 [`LineBuffer`]에 누적되고, 완성된 라인만 JSON 엔트리로
//! 파싱되어 순서대로 인제스트 채널에 전달됩니다.
//!
//! 자식이 예기치 않게 종료하면 리더는 경고를 남기고 스스로 멈추며
//! 상태를 `Failed`로 둡니다. 재시작 정책은 외부 수퍼바이저의 몫입니다.

use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use watchpost_core::error::{SourceError, WatchpostError};
use watchpost_core::source::{BoxFuture, IngestMessage, LogSource, SourceState};

use crate::journal::entry_to_record;
use crate::linebuf::LineBuffer;

const SOURCE_NAME: &str = "journal-follow";

/// 자식 프로세스 종료 대기 한도
const KILL_WAIT: Duration = Duration::from_secs(2);

/// journalctl 팔로우 모드 리더
pub struct JournalFollower {
    journalctl_path: String,
    tx: mpsc::Sender<IngestMessage>,
    state: watch::Sender<SourceState>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl JournalFollower {
    /// 새 팔로워를 생성합니다.
    pub fn new(journalctl_path: impl Into<String>, tx: mpsc::Sender<IngestMessage>) -> Self {
        let (state, _) = watch::channel(SourceState::Stopped);
        Self {
            journalctl_path: journalctl_path.into(),
            tx,
            state,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }
}

impl LogSource for JournalFollower {
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

            // -n 0: 히스토리 재생 없이 현재 테일부터 팔로우
            let spawned = Command::new(&self.journalctl_path)
                .args(["-f", "-o", "json", "-n", "0"])
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn();

            let mut child = match spawned {
                Ok(child) => child,
                Err(e) => {
                    self.state.send_replace(SourceState::Failed);
                    return Err(SourceError::Spawn {
                        source_name: SOURCE_NAME.to_owned(),
                        reason: e.to_string(),
                    }
                    .into());
                }
            };

            let Some(stdout) = child.stdout.take() else {
                self.state.send_replace(SourceState::Failed);
                return Err(SourceError::Spawn {
                    source_name: SOURCE_NAME.to_owned(),
                    reason: "stdout pipe unavailable".to_owned(),
                }
                .into());
            };
            let Some(stderr) = child.stderr.take() else {
                self.state.send_replace(SourceState::Failed);
                return Err(SourceError::Spawn {
                    source_name: SOURCE_NAME.to_owned(),
                    reason: "stderr pipe unavailable".to_owned(),
                }
                .into());
            };

            self.cancel = CancellationToken::new();
            let cancel = self.cancel.clone();
            let tx = self.tx.clone();
            let state = self.state.clone();

            self.state.send_replace(SourceState::Running);
            self.handle = Some(tokio::spawn(follow_loop(
                child, stdout, stderr, tx, state, cancel,
            )));

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
            // Failed(자식 사망)는 그대로 남겨 진단 가능하게 유지
            if self.state() != SourceState::Failed {
                self.state.send_replace(SourceState::Stopped);
            }
            Ok(())
        })
    }
}

/// 자식 프로세스 출력 소비 루프
async fn follow_loop(
    mut child: Child,
    mut stdout: tokio::process::ChildStdout,
    mut stderr: tokio::process::ChildStderr,
    tx: mpsc::Sender<IngestMessage>,
    state: watch::Sender<SourceState>,
    cancel: CancellationToken,
) {
    let mut stdout_lines = LineBuffer::new();
    let mut stderr_lines = LineBuffer::new();
    let mut stdout_chunk = vec![0u8; 8 * 1024];
    let mut stderr_chunk = vec![0u8; 8 * 1024];
    let mut stderr_open = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                shutdown_child(&mut child).await;
                warn_on_partial(&mut stdout_lines);
                state.send_replace(SourceState::Stopped);
                return;
            }
            read = stdout.read(&mut stdout_chunk) => match read {
                Ok(0) => {
                    // stdout EOF = 자식 종료
                    let code = child.wait().await.ok().and_then(|status| status.code());
                    warn!(?code, "journalctl follow process exited unexpectedly");
                    warn_on_partial(&mut stdout_lines);
                    state.send_replace(SourceState::Failed);
                    return;
                }
                Ok(n) => {
                    stdout_lines.push(&stdout_chunk[..n]);
                    if !forward_lines(&mut stdout_lines, &tx).await {
                        debug!("ingest channel closed, stopping journal follower");
                        shutdown_child(&mut child).await;
                        state.send_replace(SourceState::Stopped);
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to read journalctl stdout");
                    shutdown_child(&mut child).await;
                    state.send_replace(SourceState::Failed);
                    return;
                }
            },
            read = stderr.read(&mut stderr_chunk), if stderr_open => match read {
                Ok(0) => stderr_open = false,
                Ok(n) => {
                    // 병합 스트림: stderr 라인도 동일 경로로 파싱 시도
                    stderr_lines.push(&stderr_chunk[..n]);
                    if !forward_lines(&mut stderr_lines, &tx).await {
                        debug!("ingest channel closed, stopping journal follower");
                        shutdown_child(&mut child).await;
                        state.send_replace(SourceState::Stopped);
                        return;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "failed to read journalctl stderr");
                    stderr_open = false;
                }
            },
        }
    }
}

/// 완성된 라인을 전부 파싱해 채널로 보냅니다.
///
/// 채널이 닫혔으면 `false`를 반환합니다.
async fn forward_lines(lines: &mut LineBuffer, tx: &mpsc::Sender<IngestMessage>) -> bool {
    while let Some(line) = lines.next_line() {
        if line.is_empty() {
            continue;
        }
        let entry = match serde_json::from_slice::<Value>(&line) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "skipping non-JSON line from journalctl");
                continue;
            }
        };
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

/// 자식을 종료합니다: SIGKILL 후 한도 내 대기.
async fn shutdown_child(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "failed to signal journalctl child");
    }
    if time::timeout(KILL_WAIT, child.wait()).await.is_err() {
        warn!("journalctl child did not exit within kill wait");
    }
}

fn warn_on_partial(lines: &mut LineBuffer) {
    if let Some(partial) = lines.take_partial() {
        warn!(bytes = partial.len(), "discarding partial journal line");
    }
}
