//! 클라이언트 통합 테스트용 가짜 협력 객체.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use diagkit_client::{DiagnosticsClient, DiagnosticsClientBuilder};
use diagkit_core::config::DiagnosticsConfig;
use diagkit_core::error::CoreError;
use diagkit_core::models::diagnostics::DiagnosticsSnapshot;
use diagkit_core::ports::crash_reporter::CrashReporter;
use diagkit_core::ports::device_info::DeviceInfoProvider;
use diagkit_core::ports::uploader::DiagnosticsUploader;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// 업로드 요청을 기록만 하는 업로더
#[derive(Default)]
pub struct RecordingUploader {
    uploads: Mutex<Vec<(DiagnosticsSnapshot, f64)>>,
    fail: AtomicBool,
}

impl RecordingUploader {
    pub fn failing() -> Self {
        let uploader = Self::default();
        uploader.fail.store(true, Ordering::SeqCst);
        uploader
    }

    pub fn uploads(&self) -> Vec<(DiagnosticsSnapshot, f64)> {
        self.uploads.lock().clone()
    }
}

#[async_trait]
impl DiagnosticsUploader for RecordingUploader {
    async fn upload(&self, snapshot: &DiagnosticsSnapshot, sample_rate: f64) -> Result<(), CoreError> {
        self.uploads.lock().push((snapshot.clone(), sample_rate));
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::Http {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// 메모리에 리포트를 들고 있는 크래시 리포터
#[derive(Default)]
pub struct FakeCrashReporter {
    registered: AtomicBool,
    register_calls: AtomicUsize,
    report: Mutex<Option<String>>,
}

impl FakeCrashReporter {
    pub fn with_report(report: &str) -> Self {
        let reporter = Self::default();
        *reporter.report.lock() = Some(report.to_string());
        reporter
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn pending_report(&self) -> Option<String> {
        self.report.lock().clone()
    }
}

#[async_trait]
impl CrashReporter for FakeCrashReporter {
    fn register(&self) -> Result<(), CoreError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn unregister(&self) -> Result<(), CoreError> {
        self.registered.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    async fn check_for_previous_crash(&self) -> Option<String> {
        self.report.lock().clone()
    }

    async fn clear_crash_report(&self) {
        self.report.lock().take();
    }
}

pub struct FixedDeviceInfo;

impl DeviceInfoProvider for FixedDeviceInfo {
    fn manufacturer(&self) -> String {
        "Acme".to_string()
    }

    fn model(&self) -> String {
        "Widget 3".to_string()
    }

    fn os_name(&self) -> String {
        "AcmeOS".to_string()
    }

    fn os_version(&self) -> String {
        "17.1".to_string()
    }

    fn platform(&self) -> String {
        "test".to_string()
    }
}

pub fn test_config(enabled: bool, sample_rate: f64) -> DiagnosticsConfig {
    DiagnosticsConfig {
        enabled,
        sample_rate,
        app_version: Some("1.2.3".to_string()),
        ..DiagnosticsConfig::with_api_key("test-key")
    }
}

/// 원격 설정 없이 가짜 협력 객체로 구성한 빌더
pub fn fake_builder(
    config: DiagnosticsConfig,
    root: &Path,
    uploader: &Arc<RecordingUploader>,
    crash: &Arc<FakeCrashReporter>,
) -> DiagnosticsClientBuilder {
    DiagnosticsClient::builder(config)
        .with_storage_root(root)
        .with_uploader(uploader.clone())
        .with_crash_reporter(crash.clone())
        .with_device_info(Arc::new(FixedDeviceInfo))
        .without_remote_config()
}
