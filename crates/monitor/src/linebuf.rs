//! 증분 라인 분리기 -- 읽기 경계를 넘는 바이트 스트림에서 라인 추출
//!
//! 서브프로세스 stdout은 라인 경계와 무관하게 임의 크기의 청크로
//! 도착합니다. [`LineBuffer`]는 청크를 누적 버퍼에 추가하고, 완성된
//! `\n` 구분 라인만 순서대로 꺼내며, 끝의 미완성 라인은 다음 읽기까지
//! 명시적으로 보관합니다.

use bytes::{Buf, Bytes, BytesMut};

/// 누적 바이트 버퍼 위의 라인 분리기
///
/// "보류 중인 부분 라인"의 소유권이 이 타입에 있습니다. 스트림 종료
/// 시 남은 부분 라인은 [`LineBuffer::take_partial`]로 회수해 폐기
/// 여부를 호출자가 결정합니다.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    /// 새 라인 버퍼를 생성합니다.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// 수신한 바이트 청크를 버퍼 끝에 추가합니다.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// 완성된 다음 라인을 꺼냅니다 (`\n` 제거, 뒤따르는 `\r`도 제거).
    ///
    /// 완성된 라인이 없으면 `None`을 반환하며 버퍼는 그대로 남습니다.
    pub fn next_line(&mut self) -> Option<Bytes> {
        let newline_pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line = self.buf.split_to(newline_pos + 1);
        line.truncate(newline_pos);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Some(line.freeze())
    }

    /// 보류 중인 부분 라인의 길이 (바이트)
    pub fn partial_len(&self) -> usize {
        self.buf.len()
    }

    /// 보류 중인 부분 라인을 꺼내고 버퍼를 비웁니다.
    ///
    /// 스트림 종료 시 폐기 전 경고 로그를 남기는 용도입니다.
    pub fn take_partial(&mut self) -> Option<Bytes> {
        if self.buf.is_empty() {
            return None;
        }
        let remaining = self.buf.copy_to_bytes(self.buf.remaining());
        Some(remaining)
    }
}
