//! 세션 진단 저장소.
//!
//! 현재 세션의 태그/카운터/히스토그램/이벤트를 메모리에 누적하고,
//! 짧은 타이머로 변경분만 묶어 세션 디렉토리에 영속화한다.
//! 다음 실행은 이전 세션 디렉토리를 스냅샷으로 읽어 들인 뒤 삭제한다.
//!
//! 구조: `<root>/diagkit.diagnostics/<fnv1a64(instance)>/<session_start>/`

use chrono::Utc;
use diagkit_core::error::CoreError;
use diagkit_core::models::diagnostics::{
    DiagnosticsEvent, DiagnosticsSnapshot, HistogramStats, MAX_EVENTS_PER_SESSION,
};
use diagkit_core::sampler::fnv1a64;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::session_files::{
    self, COUNTERS_FILE, HISTOGRAMS_FILE, MAX_EVENTS_LOG_BYTES, TAGS_FILE,
};

/// 저장소 루트 아래 고정 네임스페이스
pub const STORAGE_NAMESPACE: &str = "diagkit.diagnostics";

/// 기본 영속화 배치 간격
pub const DEFAULT_PERSIST_INTERVAL: Duration = Duration::from_secs(1);

/// 저장소 동작 옵션
#[derive(Debug, Clone, Copy)]
pub struct StorageOptions {
    /// 변경분을 묶어 기록하기까지 기다리는 시간
    pub persist_interval: Duration,
    /// 이벤트 로그 회전 한도 (바이트)
    pub max_events_log_bytes: u64,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            persist_interval: DEFAULT_PERSIST_INTERVAL,
            max_events_log_bytes: MAX_EVENTS_LOG_BYTES,
        }
    }
}

/// 마지막 영속화 이후 변경된 항목
#[derive(Debug, Default, Clone, Copy)]
struct Dirty {
    tags: bool,
    counters: bool,
    histograms: bool,
}

impl Dirty {
    fn all() -> Self {
        Self {
            tags: true,
            counters: true,
            histograms: true,
        }
    }

    fn any(&self) -> bool {
        self.tags || self.counters || self.histograms
    }
}

#[derive(Default)]
struct StorageState {
    should_store: bool,
    tags: BTreeMap<String, String>,
    counters: BTreeMap<String, i64>,
    histograms: BTreeMap<String, HistogramStats>,
    events: Vec<DiagnosticsEvent>,
    /// 아직 로그에 덧붙이지 않은 이벤트
    pending_events: Vec<DiagnosticsEvent>,
    dirty: Dirty,
}

impl StorageState {
    fn has_unsaved(&self) -> bool {
        self.dirty.any() || !self.pending_events.is_empty()
    }
}

struct StorageInner {
    /// 인스턴스 디렉토리 (루트가 없으면 메모리 전용)
    instance_dir: Option<PathBuf>,
    session_name: String,
    options: StorageOptions,
    state: Mutex<StorageState>,
    persist_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl StorageInner {
    fn session_dir(&self) -> Option<PathBuf> {
        self.instance_dir
            .as_ref()
            .map(|dir| dir.join(&self.session_name))
    }

    fn cancel_persist_timer(&self) {
        if let Some(task) = self.persist_task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for StorageInner {
    fn drop(&mut self) {
        if let Some(task) = self.persist_task.get_mut().take() {
            task.abort();
        }
    }
}

/// 세션 진단 저장소
///
/// 복제해도 같은 세션 상태를 공유한다.
#[derive(Clone)]
pub struct DiagnosticsStorage {
    inner: Arc<StorageInner>,
}

impl DiagnosticsStorage {
    /// 기본 옵션으로 새 저장소 생성
    ///
    /// # Arguments
    /// * `root` - 플랫폼 지원 디렉토리 (`None`이면 디스크에 쓰지 않음)
    /// * `instance_name` - 인스턴스 이름 (디렉토리 해시 입력)
    /// * `session_start` - 세션 시작 시각 (epoch 초, 디렉토리 이름)
    /// * `should_store` - 초기 영속화 여부
    pub fn new(root: Option<PathBuf>, instance_name: &str, session_start: f64, should_store: bool) -> Self {
        Self::with_options(
            root,
            instance_name,
            session_start,
            should_store,
            StorageOptions::default(),
        )
    }

    /// 영속화 간격과 로그 회전 한도를 지정해 새 저장소 생성
    pub fn with_options(
        root: Option<PathBuf>,
        instance_name: &str,
        session_start: f64,
        should_store: bool,
        options: StorageOptions,
    ) -> Self {
        let instance_dir = root.map(|root| {
            root.join(STORAGE_NAMESPACE)
                .join(format!("{:016x}", fnv1a64(instance_name)))
        });

        Self {
            inner: Arc::new(StorageInner {
                instance_dir,
                session_name: session_dir_name(session_start),
                options,
                state: Mutex::new(StorageState {
                    should_store,
                    ..StorageState::default()
                }),
                persist_task: parking_lot::Mutex::new(None),
            }),
        }
    }

    /// 현재 세션 디렉토리
    pub fn session_dir(&self) -> Option<PathBuf> {
        self.inner.session_dir()
    }

    /// 이 인스턴스의 세션 디렉토리들이 놓이는 경로
    pub fn instance_dir(&self) -> Option<&Path> {
        self.inner.instance_dir.as_deref()
    }

    // ============================================================
    // 변경 연산
    // ============================================================

    pub async fn set_tag(&self, name: impl Into<String>, value: impl Into<String>) {
        {
            let mut state = self.inner.state.lock().await;
            state.tags.insert(name.into(), value.into());
            state.dirty.tags = true;
        }
        self.arm_persist_timer().await;
    }

    /// 태그 병합 (같은 키는 나중 값이 이긴다)
    pub async fn set_tags(&self, tags: HashMap<String, String>) {
        if tags.is_empty() {
            return;
        }
        {
            let mut state = self.inner.state.lock().await;
            state.tags.extend(tags);
            state.dirty.tags = true;
        }
        self.arm_persist_timer().await;
    }

    pub async fn increment(&self, name: impl Into<String>, size: i64) {
        {
            let mut state = self.inner.state.lock().await;
            let counter = state.counters.entry(name.into()).or_insert(0);
            *counter = counter.saturating_add(size);
            state.dirty.counters = true;
        }
        self.arm_persist_timer().await;
    }

    /// 히스토그램 값 기록. 유한하지 않은 값은 버린다.
    pub async fn record_histogram(&self, name: impl Into<String>, value: f64) {
        let name = name.into();
        if !value.is_finite() {
            debug!("유한하지 않은 히스토그램 값 무시: {name}={value}");
            return;
        }
        {
            let mut state = self.inner.state.lock().await;
            state.histograms.entry(name).or_default().record(value);
            state.dirty.histograms = true;
        }
        self.arm_persist_timer().await;
    }

    /// 이벤트 기록. 세션 버퍼가 가득 차면 조용히 버린다.
    pub async fn record_event(&self, name: impl Into<String>, properties: Option<Map<String, Value>>) {
        let name = name.into();
        {
            let mut state = self.inner.state.lock().await;
            if state.events.len() >= MAX_EVENTS_PER_SESSION {
                debug!("이벤트 버퍼 가득 참 ({MAX_EVENTS_PER_SESSION}개), 버림: {name}");
                return;
            }
            let event = DiagnosticsEvent::new(name, now_seconds(), properties);
            state.events.push(event.clone());
            state.pending_events.push(event);
        }
        self.arm_persist_timer().await;
    }

    // ============================================================
    // 영속화 제어
    // ============================================================

    /// 영속화 on/off
    ///
    /// 끄면 타이머를 멈추고 카운터/히스토그램/이벤트 파일을 지운다. 태그 파일은 남긴다.
    /// 다시 켜면 메모리 상태 전체를 다시 기록하도록 표시한다.
    pub async fn set_should_store(&self, should_store: bool) {
        {
            let mut state = self.inner.state.lock().await;
            if state.should_store == should_store {
                return;
            }
            state.should_store = should_store;

            if should_store {
                state.dirty = Dirty::all();
                state.pending_events = state.events.clone();
            } else {
                self.inner.cancel_persist_timer();
                if let Some(dir) = self.inner.session_dir() {
                    if let Err(e) = session_files::remove_accumulated_files(&dir).await {
                        warn!("세션 파일 삭제 실패: {}: {e}", dir.display());
                    }
                }
            }
        }

        if should_store {
            self.arm_persist_timer().await;
        }
    }

    /// 변경된 항목만 디스크에 기록 (멱등)
    pub async fn persist_if_needed(&self) {
        let mut state = self.inner.state.lock().await;
        if !state.should_store || !state.has_unsaved() {
            return;
        }
        let Some(dir) = self.inner.session_dir() else {
            return;
        };

        let max_log_bytes = self.inner.options.max_events_log_bytes;
        if let Err(e) = persist_state(&dir, &mut state, max_log_bytes).await {
            warn!("진단 영속화 실패: {}: {e}", dir.display());
        }
    }

    /// 영속화되지 않은 변경이 있는지
    pub async fn has_unsaved_changes(&self) -> bool {
        self.inner.state.lock().await.has_unsaved()
    }

    async fn arm_persist_timer(&self) {
        {
            let state = self.inner.state.lock().await;
            if !state.should_store || !state.has_unsaved() || self.inner.instance_dir.is_none() {
                return;
            }
        }

        let mut slot = self.inner.persist_task.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let weak: Weak<StorageInner> = Arc::downgrade(&self.inner);
        let interval = self.inner.options.persist_interval;
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.persist_task.lock().take();
            DiagnosticsStorage { inner }.persist_if_needed().await;
        }));
    }

    // ============================================================
    // 스냅샷
    // ============================================================

    /// 현재 누적 상태 복사본 (비우지 않음)
    pub async fn current_snapshot(&self) -> DiagnosticsSnapshot {
        let state = self.inner.state.lock().await;
        DiagnosticsSnapshot {
            tags: state.tags.clone(),
            counters: state.counters.clone(),
            histograms: state.histograms.clone(),
            events: state.events.clone(),
        }
    }

    /// 현재 세션을 스냅샷으로 꺼내고 카운터/히스토그램/이벤트를 비운다.
    ///
    /// 태그와 태그 파일은 유지된다.
    pub async fn dump_and_clear_current_session(&self) -> DiagnosticsSnapshot {
        let mut state = self.inner.state.lock().await;
        let snapshot = DiagnosticsSnapshot {
            tags: state.tags.clone(),
            counters: std::mem::take(&mut state.counters),
            histograms: std::mem::take(&mut state.histograms),
            events: std::mem::take(&mut state.events),
        };
        state.pending_events.clear();
        state.dirty.counters = false;
        state.dirty.histograms = false;

        if let Some(dir) = self.inner.session_dir() {
            if let Err(e) = session_files::remove_accumulated_files(&dir).await {
                warn!("덤프 후 세션 파일 삭제 실패: {}: {e}", dir.display());
            }
        }
        snapshot
    }

    /// 현재 세션을 제외한 이전 세션들을 읽고 디렉토리를 삭제한다.
    ///
    /// 누적 데이터가 없는 세션은 결과에서 빠지지만 디렉토리는 역시 삭제된다.
    /// 결과는 세션 시작 시각 오름차순.
    pub async fn load_and_clear_previous_sessions(&self) -> Vec<DiagnosticsSnapshot> {
        let Some(instance_dir) = self.inner.instance_dir.as_ref() else {
            return Vec::new();
        };

        let mut entries = match tokio::fs::read_dir(instance_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("이전 세션 목록 읽기 실패: {}: {e}", instance_dir.display());
                return Vec::new();
            }
        };

        let mut sessions = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("이전 세션 항목 읽기 실패: {e}");
                    break;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if name == self.inner.session_name {
                continue;
            }
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }

            let path = entry.path();
            let snapshot = session_files::read_snapshot(&path).await;
            if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                warn!("이전 세션 디렉토리 삭제 실패: {}: {e}", path.display());
            }

            if snapshot.has_data() {
                let sort_key = name.parse::<f64>().unwrap_or(f64::MAX);
                sessions.push((sort_key, snapshot));
            } else {
                debug!("빈 이전 세션 삭제: {name}");
            }
        }

        sessions.sort_by(|a, b| a.0.total_cmp(&b.0));
        if !sessions.is_empty() {
            info!("이전 세션 {}개 로드", sessions.len());
        }
        sessions.into_iter().map(|(_, snapshot)| snapshot).collect()
    }
}

/// 세션 디렉토리 이름 (epoch 초의 10진 표기)
pub fn session_dir_name(session_start: f64) -> String {
    format!("{session_start}")
}

fn now_seconds() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

async fn persist_state(dir: &Path, state: &mut StorageState, max_log_bytes: u64) -> Result<(), CoreError> {
    if state.dirty.tags {
        session_files::write_json_atomic(dir, TAGS_FILE, &state.tags).await?;
        state.dirty.tags = false;
    }
    if state.dirty.counters {
        session_files::write_json_atomic(dir, COUNTERS_FILE, &state.counters).await?;
        state.dirty.counters = false;
    }
    if state.dirty.histograms {
        session_files::write_json_atomic(dir, HISTOGRAMS_FILE, &state.histograms).await?;
        state.dirty.histograms = false;
    }
    if !state.pending_events.is_empty() {
        session_files::append_events(dir, &state.pending_events, max_log_bytes).await?;
        state.pending_events.clear();
    }
    debug!("진단 영속화 완료: {}", dir.display());
    Ok(())
}
