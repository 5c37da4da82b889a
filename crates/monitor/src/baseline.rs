//! 베이스라인 추적기 -- 카테고리별 300초 윈도우 빈도 집계
//!
//! [`BaselineTracker`]는 카테고리마다 롤링 윈도우 하나를 유지합니다.
//! 관측이 윈도우 시작으로부터 300초를 넘겨 도착하면 윈도우를 리셋하고,
//! 아니면 카운트를 올립니다. 통계적 z-score가 아니라 "최근 5분 안에
//! 몇 번 발생했나"라는 단순 빈도 신호이며, 이상 여부 임계값 적용은
//! 호출자 몫입니다.
//!
//! 인메모리 전용 — 데몬 재시작 시 소실됩니다.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};

use watchpost_core::types::{Category, Event};

/// 윈도우 길이 (초)
const WINDOW_SECS: i64 = 300;

/// 카테고리별 롤링 윈도우 버킷
#[derive(Debug, Clone, Copy)]
struct Bucket {
    window_start: DateTime<Utc>,
    count: u64,
}

/// 카테고리별 발생 빈도 추적기
///
/// 단일 인제스트 태스크가 독점 소유하므로 잠금이 없습니다.
#[derive(Debug, Default)]
pub struct BaselineTracker {
    buckets: HashMap<Category, Bucket>,
}

impl BaselineTracker {
    /// 새 추적기를 생성합니다.
    pub fn new() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }

    /// 이벤트를 관측합니다.
    ///
    /// 버킷이 없거나 이벤트 시각이 윈도우 시작 + 300초를 지났으면
    /// 윈도우를 이벤트 시각으로 리셋한 뒤, 항상 카운트를 1 올립니다.
    pub fn observe(&mut self, event: &Event) {
        let bucket = self.buckets.entry(event.category).or_insert(Bucket {
            window_start: event.timestamp,
            count: 0,
        });

        if event.timestamp.signed_duration_since(bucket.window_start)
            > TimeDelta::seconds(WINDOW_SECS)
        {
            bucket.window_start = event.timestamp;
            bucket.count = 0;
        }

        bucket.count += 1;
    }

    /// 이벤트 카테고리의 현재 윈도우 카운트를 반환합니다.
    ///
    /// 버킷이 없으면 0.0 — "특이하지 않음"을 의미합니다.
    pub fn score(&self, event: &Event) -> f64 {
        self.buckets
            .get(&event.category)
            .map(|bucket| bucket.count as f64)
            .unwrap_or(0.0)
    }
}
