//! 진단 데이터 모델: 히스토그램 누적값, 이벤트, 세션 스냅샷, 업로드 페이로드.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// 세션 하나에 보관하는 최대 이벤트 수
pub const MAX_EVENTS_PER_SESSION: usize = 10;

/// 히스토그램 누적 통계. 원본 샘플은 보관하지 않는다.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramStats {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
}

impl Default for HistogramStats {
    fn default() -> Self {
        Self {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
        }
    }
}

impl HistogramStats {
    /// 값 하나를 누적
    pub fn record(&mut self, value: f64) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
    }

    /// 평균 (count가 0이면 0)
    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// 개별 진단 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsEvent {
    #[serde(rename = "event_name")]
    pub name: String,
    /// 기록 시각 (epoch 초)
    pub time: f64,
    #[serde(rename = "event_properties")]
    pub properties: Option<Map<String, Value>>,
}

impl DiagnosticsEvent {
    pub fn new(name: impl Into<String>, time: f64, properties: Option<Map<String, Value>>) -> Self {
        Self {
            name: name.into(),
            time,
            properties,
        }
    }
}

/// 업로드에 넘기는 세션 스냅샷
///
/// `tags`는 항상 전체 태그, 나머지는 마지막 덤프 이후 누적분이다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagnosticsSnapshot {
    pub tags: BTreeMap<String, String>,
    pub counters: BTreeMap<String, i64>,
    pub histograms: BTreeMap<String, HistogramStats>,
    pub events: Vec<DiagnosticsEvent>,
}

impl DiagnosticsSnapshot {
    /// 태그를 제외한 누적 데이터가 있는지
    pub fn has_data(&self) -> bool {
        !self.counters.is_empty() || !self.histograms.is_empty() || !self.events.is_empty()
    }
}

/// 업로드용 히스토그램 요약
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    /// 소수점 둘째 자리 반올림
    pub avg: f64,
}

impl From<&HistogramStats> for HistogramSummary {
    fn from(stats: &HistogramStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            avg: (stats.avg() * 100.0).round() / 100.0,
        }
    }
}

/// `POST /v1/capture` 본문
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsPayload {
    pub tags: BTreeMap<String, String>,
    pub counters: BTreeMap<String, i64>,
    pub histogram: BTreeMap<String, HistogramSummary>,
    pub events: Vec<DiagnosticsEvent>,
}

impl From<&DiagnosticsSnapshot> for DiagnosticsPayload {
    fn from(snapshot: &DiagnosticsSnapshot) -> Self {
        Self {
            tags: snapshot.tags.clone(),
            counters: snapshot.counters.clone(),
            histogram: snapshot
                .histograms
                .iter()
                .map(|(name, stats)| (name.clone(), HistogramSummary::from(stats)))
                .collect(),
            events: snapshot.events.clone(),
        }
    }
}
