//! 진단 클라이언트.
//!
//! 세션 샘플링 게이트(`enabled && is_in_sample`)를 관리하고,
//! 게이트가 열려 있을 때만 저장소에 기록한다.
//!
//! - 게이트가 처음 열리면 한 번만 초기화: 이전 세션 업로드, 정적 태그, 크래시 캡처
//! - 변경이 생기면 플러시 타이머를 걸고, 만료 시 현재 세션을 덤프해 업로드
//! - 원격 설정의 `enabled`/`sampleRate`를 `update_config` 경로로 반영

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use diagkit_core::config::{clamp_sample_rate, DiagnosticsConfig};
use diagkit_core::config_manager::ConfigManager;
use diagkit_core::error::CoreError;
use diagkit_core::models::diagnostics::DiagnosticsSnapshot;
use diagkit_core::models::remote_config::{DeliveryMode, RemoteConfig};
use diagkit_core::ports::crash_reporter::CrashReporter;
use diagkit_core::ports::device_info::DeviceInfoProvider;
use diagkit_core::ports::remote_config_storage::RemoteConfigStorage;
use diagkit_core::ports::uploader::DiagnosticsUploader;
use diagkit_core::sampler::is_in_sample;
use diagkit_core::LIBRARY_VERSION;
use diagkit_crash::{create_platform_crash_reporter, default_report_path, NoOpCrashReporter};
use diagkit_network::{HttpDiagnosticsUploader, RemoteConfigClient, SubscriptionToken};
use diagkit_storage::{
    DiagnosticsStorage, FileRemoteConfigStorage, MemoryRemoteConfigStorage, StorageOptions,
};

use crate::device::SysInfoDeviceInfo;

/// 활성화 시 1 증가하는 카운터
const SAMPLED_IN_COUNTER: &str = "sampled.in.and.enabled";

/// 크래시 카운터/이벤트 이름
const CRASH_EVENT: &str = "analytics.crash";

// ============================================================
// 설정 변경
// ============================================================

/// `update_config` 입력. `None`인 항목은 유지된다.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfigUpdate {
    pub enabled: Option<bool>,
    pub sample_rate: Option<f64>,
    pub crash_capture_enabled: Option<bool>,
}

impl ConfigUpdate {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    pub fn sample_rate(sample_rate: f64) -> Self {
        Self {
            sample_rate: Some(sample_rate),
            ..Self::default()
        }
    }

    pub fn crash_capture_enabled(crash_capture_enabled: bool) -> Self {
        Self {
            crash_capture_enabled: Some(crash_capture_enabled),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.sample_rate.is_none() && self.crash_capture_enabled.is_none()
    }

    /// 원격 설정에서 `enabled`(bool), `sampleRate`(number)만 꺼낸다. 타입이 다르면 무시.
    pub fn from_remote(config: &RemoteConfig) -> Self {
        Self {
            enabled: config.get("enabled").and_then(Value::as_bool),
            sample_rate: config.get("sampleRate").and_then(Value::as_f64),
            crash_capture_enabled: None,
        }
    }
}

// ============================================================
// 빌더
// ============================================================

/// [`DiagnosticsClient`] 빌더
///
/// 주입하지 않은 협력 객체는 설정으로부터 기본 구현을 만든다.
pub struct DiagnosticsClientBuilder {
    config: DiagnosticsConfig,
    storage_root: Option<PathBuf>,
    uploader: Option<Arc<dyn DiagnosticsUploader>>,
    crash_reporter: Option<Arc<dyn CrashReporter>>,
    device_info: Option<Arc<dyn DeviceInfoProvider>>,
    remote_config: Option<RemoteConfigClient>,
    remote_config_disabled: bool,
}

impl DiagnosticsClientBuilder {
    fn new(config: DiagnosticsConfig) -> Self {
        Self {
            config,
            storage_root: None,
            uploader: None,
            crash_reporter: None,
            device_info: None,
            remote_config: None,
            remote_config_disabled: false,
        }
    }

    /// 저장소 루트 (설정의 `storage_root`보다 우선)
    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = Some(root.into());
        self
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn DiagnosticsUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_crash_reporter(mut self, crash_reporter: Arc<dyn CrashReporter>) -> Self {
        self.crash_reporter = Some(crash_reporter);
        self
    }

    pub fn with_device_info(mut self, device_info: Arc<dyn DeviceInfoProvider>) -> Self {
        self.device_info = Some(device_info);
        self
    }

    /// 공유 원격 설정 클라이언트 주입
    pub fn with_remote_config(mut self, remote_config: RemoteConfigClient) -> Self {
        self.remote_config = Some(remote_config);
        self.remote_config_disabled = false;
        self
    }

    /// 원격 설정 구독 없이 로컬 설정만 사용
    pub fn without_remote_config(mut self) -> Self {
        self.remote_config = None;
        self.remote_config_disabled = true;
        self
    }

    fn resolve_storage_root(&self) -> Option<PathBuf> {
        if let Some(root) = self.storage_root.clone().or_else(|| self.config.storage_root.clone()) {
            return Some(root);
        }
        match ConfigManager::data_dir() {
            Ok(dir) => Some(dir),
            Err(e) => {
                warn!("저장소 루트 결정 실패, 메모리 전용으로 동작: {e}");
                None
            }
        }
    }

    /// 클라이언트 생성
    ///
    /// tokio 런타임 안에서 호출해야 한다. 게이트가 열려 있으면
    /// 초기화(이전 세션 업로드 포함)가 끝난 뒤 반환한다.
    pub async fn build(self) -> Result<DiagnosticsClient, CoreError> {
        let root = self.resolve_storage_root();
        let config = self.config;
        let instance_name = config.effective_instance_name().to_string();

        let uploader: Arc<dyn DiagnosticsUploader> = match self.uploader {
            Some(uploader) => uploader,
            None => Arc::new(HttpDiagnosticsUploader::from_config(&config)?),
        };

        let crash_reporter: Arc<dyn CrashReporter> = match (self.crash_reporter, &root) {
            (Some(reporter), _) => reporter,
            (None, Some(root)) => create_platform_crash_reporter(default_report_path(root)),
            (None, None) => Arc::new(NoOpCrashReporter::new()),
        };

        let device_info: Arc<dyn DeviceInfoProvider> = match self.device_info {
            Some(device_info) => device_info,
            None => Arc::new(SysInfoDeviceInfo::new()),
        };

        let remote_config = match (self.remote_config, self.remote_config_disabled) {
            (Some(client), _) => Some(client),
            (None, true) => None,
            (None, false) => {
                let cache: Arc<dyn RemoteConfigStorage> = match &root {
                    Some(root) => Arc::new(FileRemoteConfigStorage::new(root, &instance_name)),
                    None => Arc::new(MemoryRemoteConfigStorage::new()),
                };
                Some(RemoteConfigClient::from_config(&config, cache)?)
            }
        };

        let session_start = Utc::now().timestamp_millis() as f64 / 1000.0;
        let enabled = config.enabled;
        let sample_rate = config.clamped_sample_rate();
        let should_track = compute_should_track(session_start, enabled, sample_rate);

        let storage = DiagnosticsStorage::with_options(
            root,
            &instance_name,
            session_start,
            should_track,
            StorageOptions {
                persist_interval: config.persist_interval(),
                ..StorageOptions::default()
            },
        );

        let (running_tx, _) = watch::channel(should_track);
        let inner = Arc::new(ClientInner {
            session_start,
            storage,
            uploader,
            crash_reporter,
            device_info,
            remote_config,
            subscription: parking_lot::Mutex::new(None),
            remote_updates: parking_lot::Mutex::new(None),
            state: Mutex::new(ClientState {
                enabled,
                sample_rate,
                crash_capture_enabled: config.crash_capture_enabled,
                should_track,
                flush_task: None,
            }),
            running_tx,
            initialized: AtomicBool::new(false),
            config,
        });

        debug!(
            "진단 클라이언트 생성: 세션={session_start}, enabled={enabled}, rate={sample_rate}, 수집={should_track}"
        );

        if should_track {
            inner.initialize().await;
        }
        inner.subscribe_remote_config();

        Ok(DiagnosticsClient { inner })
    }
}

fn compute_should_track(session_start: f64, enabled: bool, sample_rate: f64) -> bool {
    enabled && is_in_sample(&session_start.to_string(), sample_rate)
}

// ============================================================
// 클라이언트
// ============================================================

/// 진단 클라이언트
///
/// 복제해도 같은 세션을 공유한다. 마지막 복제본이 사라지면
/// 원격 설정 구독을 해제하고 플러시 타이머를 취소한다.
#[derive(Clone)]
pub struct DiagnosticsClient {
    inner: Arc<ClientInner>,
}

struct ClientState {
    enabled: bool,
    sample_rate: f64,
    crash_capture_enabled: bool,
    should_track: bool,
    flush_task: Option<JoinHandle<()>>,
}

struct ClientInner {
    config: DiagnosticsConfig,
    session_start: f64,
    storage: DiagnosticsStorage,
    uploader: Arc<dyn DiagnosticsUploader>,
    crash_reporter: Arc<dyn CrashReporter>,
    device_info: Arc<dyn DeviceInfoProvider>,
    remote_config: Option<RemoteConfigClient>,
    subscription: parking_lot::Mutex<Option<SubscriptionToken>>,
    /// 원격 설정 변경을 도착 순서대로 적용하는 단일 소비 태스크
    remote_updates: parking_lot::Mutex<Option<JoinHandle<()>>>,
    state: Mutex<ClientState>,
    running_tx: watch::Sender<bool>,
    initialized: AtomicBool,
}

impl DiagnosticsClient {
    pub fn builder(config: DiagnosticsConfig) -> DiagnosticsClientBuilder {
        DiagnosticsClientBuilder::new(config)
    }

    /// 세션 시작 시각 (epoch 초)
    pub fn session_start(&self) -> f64 {
        self.inner.session_start
    }

    /// 현재 수집 여부
    pub fn should_track(&self) -> bool {
        self.inner.should_track()
    }

    /// 수집 여부 변화 구독. 수신기는 현재 값으로 시작한다.
    pub fn observe_should_track(&self) -> watch::Receiver<bool> {
        self.inner.running_tx.subscribe()
    }

    pub async fn set_tag(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.set_tag(name.into(), value.into()).await;
    }

    pub async fn set_tags(&self, tags: HashMap<String, String>) {
        self.inner.set_tags(tags).await;
    }

    pub async fn increment(&self, name: impl Into<String>, size: i64) {
        self.inner.increment(name.into(), size).await;
    }

    pub async fn record_histogram(&self, name: impl Into<String>, value: f64) {
        self.inner.record_histogram(name.into(), value).await;
    }

    pub async fn record_event(&self, name: impl Into<String>, properties: Option<Map<String, Value>>) {
        self.inner.record_event(name.into(), properties).await;
    }

    /// 현재 세션을 즉시 덤프해 업로드 (누적 데이터가 있을 때만)
    pub async fn flush(&self) {
        self.inner.flush().await;
    }

    /// 대기 중인 변경을 디스크에 기록
    pub async fn persist_if_needed(&self) {
        self.inner.storage.persist_if_needed().await;
    }

    /// enabled / sample_rate / crash capture 변경
    ///
    /// 게이트는 enabled나 sample_rate가 실제로 바뀐 경우에만 다시 계산한다.
    pub async fn update_config(&self, update: ConfigUpdate) {
        self.inner.update_config(update).await;
    }

    /// 현재 누적 상태 (비우지 않음)
    pub async fn current_snapshot(&self) -> DiagnosticsSnapshot {
        self.inner.storage.current_snapshot().await
    }
}

impl ClientInner {
    fn should_track(&self) -> bool {
        *self.running_tx.borrow()
    }

    // ============================================================
    // 기록 (게이트 통과 시에만)
    // ============================================================

    async fn set_tag(self: &Arc<Self>, name: String, value: String) {
        if !self.should_track() {
            return;
        }
        self.storage.set_tag(name, value).await;
        self.arm_flush_timer().await;
    }

    async fn set_tags(self: &Arc<Self>, tags: HashMap<String, String>) {
        if !self.should_track() {
            return;
        }
        self.storage.set_tags(tags).await;
        self.arm_flush_timer().await;
    }

    async fn increment(self: &Arc<Self>, name: String, size: i64) {
        if !self.should_track() {
            return;
        }
        self.storage.increment(name, size).await;
        self.arm_flush_timer().await;
    }

    async fn record_histogram(self: &Arc<Self>, name: String, value: f64) {
        if !self.should_track() {
            return;
        }
        self.storage.record_histogram(name, value).await;
        self.arm_flush_timer().await;
    }

    async fn record_event(self: &Arc<Self>, name: String, properties: Option<Map<String, Value>>) {
        if !self.should_track() {
            return;
        }
        self.storage.record_event(name, properties).await;
        self.arm_flush_timer().await;
    }

    // ============================================================
    // 플러시 / 업로드
    // ============================================================

    async fn arm_flush_timer(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.flush_task.is_some() || !state.should_track {
            return;
        }

        let weak: Weak<ClientInner> = Arc::downgrade(self);
        let interval = self.config.flush_interval();
        state.flush_task = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.state.lock().await.flush_task = None;
            inner.flush().await;
        }));
    }

    async fn flush(&self) {
        if !self.should_track() {
            return;
        }

        let snapshot = self.storage.dump_and_clear_current_session().await;
        if !snapshot.has_data() {
            debug!("플러시할 진단 데이터 없음");
            return;
        }
        self.upload_snapshot(&snapshot).await;
    }

    /// 한 번만 시도. 실패해도 데이터는 복구하지 않는다.
    async fn upload_snapshot(&self, snapshot: &DiagnosticsSnapshot) {
        let sample_rate = self.state.lock().await.sample_rate;
        match self.uploader.upload(snapshot, sample_rate).await {
            Ok(()) => debug!(
                "진단 업로드 완료: 카운터 {}개, 히스토그램 {}개, 이벤트 {}개",
                snapshot.counters.len(),
                snapshot.histograms.len(),
                snapshot.events.len()
            ),
            Err(e) => warn!("진단 업로드 실패 (데이터 폐기): {e}"),
        }
    }

    async fn flush_previous_sessions(&self) {
        let snapshots = self.storage.load_and_clear_previous_sessions().await;
        if snapshots.is_empty() {
            return;
        }
        info!("이전 세션 {}개 업로드", snapshots.len());
        for snapshot in &snapshots {
            self.upload_snapshot(snapshot).await;
        }
    }

    // ============================================================
    // 초기화 (게이트가 처음 열릴 때 한 번)
    // ============================================================

    async fn initialize(self: &Arc<Self>) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("진단 수집 활성화: 세션 {}", self.session_start);

        let (enabled, crash_capture_enabled) = {
            let state = self.state.lock().await;
            (state.enabled, state.crash_capture_enabled)
        };

        tokio::join!(
            async {
                if enabled {
                    self.flush_previous_sessions().await;
                }
            },
            self.set_static_tags(),
            async {
                if crash_capture_enabled {
                    self.setup_crash_capture().await;
                }
            },
        );
    }

    async fn set_static_tags(self: &Arc<Self>) {
        self.increment(SAMPLED_IN_COUNTER.to_string(), 1).await;

        let device = &self.device_info;
        let mut tags = HashMap::new();
        tags.insert(
            "version_name".to_string(),
            self.config.app_version.clone().unwrap_or_default(),
        );
        tags.insert("device_manufacturer".to_string(), device.manufacturer());
        tags.insert("device_model".to_string(), device.model());
        tags.insert("os_name".to_string(), device.os_name());
        tags.insert("os_version".to_string(), device.os_version());
        tags.insert("platform".to_string(), device.platform());
        tags.insert(
            format!("sdk.{}.version", self.config.library),
            LIBRARY_VERSION.to_string(),
        );

        self.set_tags(tags).await;
    }

    async fn setup_crash_capture(self: &Arc<Self>) {
        if let Err(e) = self.crash_reporter.register() {
            warn!("크래시 리포터 등록 실패: {e}");
        }

        let Some(report) = self.crash_reporter.check_for_previous_crash().await else {
            return;
        };
        info!("이전 실행의 크래시 리포트 발견 ({} bytes)", report.len());
        self.crash_reporter.clear_crash_report().await;

        self.increment(CRASH_EVENT.to_string(), 1).await;
        let mut properties = Map::new();
        properties.insert("report".to_string(), Value::String(report));
        self.record_event(CRASH_EVENT.to_string(), Some(properties)).await;
    }

    // ============================================================
    // 설정 반영
    // ============================================================

    async fn update_config(self: &Arc<Self>, update: ConfigUpdate) {
        let (was_tracking, now_tracking, crash_change) = {
            let mut state = self.state.lock().await;
            let mut gate_inputs_changed = false;

            if let Some(enabled) = update.enabled {
                if state.enabled != enabled {
                    state.enabled = enabled;
                    gate_inputs_changed = true;
                }
            }
            if let Some(rate) = update.sample_rate.map(clamp_sample_rate) {
                if state.sample_rate != rate {
                    state.sample_rate = rate;
                    gate_inputs_changed = true;
                }
            }

            let crash_change = update
                .crash_capture_enabled
                .filter(|&enabled| enabled != state.crash_capture_enabled);
            if let Some(enabled) = crash_change {
                state.crash_capture_enabled = enabled;
            }

            let was_tracking = state.should_track;
            if gate_inputs_changed {
                state.should_track =
                    compute_should_track(self.session_start, state.enabled, state.sample_rate);
            }
            if was_tracking && !state.should_track {
                if let Some(task) = state.flush_task.take() {
                    task.abort();
                }
            }
            (was_tracking, state.should_track, crash_change)
        };

        if was_tracking != now_tracking {
            info!("진단 수집 상태 변경: {was_tracking} → {now_tracking}");
            self.storage.set_should_store(now_tracking).await;
            self.running_tx.send_replace(now_tracking);
            if now_tracking {
                self.initialize().await;
            }
        }

        // 이번 변경으로 게이트가 열렸다면 initialize에서 이미 등록했다
        match crash_change {
            Some(true) if was_tracking && now_tracking => {
                self.setup_crash_capture().await;
            }
            Some(false) => {
                if let Err(e) = self.crash_reporter.unregister() {
                    warn!("크래시 리포터 해제 실패: {e}");
                }
            }
            _ => {}
        }
    }

    fn subscribe_remote_config(self: &Arc<Self>) {
        let Some(remote) = &self.remote_config else {
            return;
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<ConfigUpdate>();
        let weak = Arc::downgrade(self);
        *self.remote_updates.lock() = Some(tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.update_config(update).await;
            }
        }));

        let token = remote.subscribe(
            Some(&self.config.remote_config_key),
            DeliveryMode::All,
            move |config, source, _| {
                let Some(config) = config else {
                    return;
                };
                let update = ConfigUpdate::from_remote(&config);
                if update.is_empty() {
                    return;
                }
                debug!("원격 진단 설정 수신 ({source:?}): {update:?}");
                if tx.send(update).is_err() {
                    debug!("클라이언트 종료됨, 원격 설정 무시");
                }
            },
        );
        *self.subscription.lock() = Some(token);
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let (Some(remote), Some(token)) = (&self.remote_config, self.subscription.get_mut().take()) {
            remote.unsubscribe(token);
        }
        if let Some(task) = self.remote_updates.get_mut().take() {
            task.abort();
        }
        if let Some(task) = self.state.get_mut().flush_task.take() {
            task.abort();
        }
    }
}
