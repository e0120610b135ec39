//! 진단 파이프라인 설정 구조체.
//!
//! API 키, 서버 리전, 샘플링, 플러시/영속화 주기, 원격 설정 재시도 정책 등
//! 런타임 설정을 정의한다. `config` crate를 통해 파일/환경변수에서 로드.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 인스턴스 이름이 비어 있을 때 사용하는 기본값
pub const DEFAULT_INSTANCE_NAME: &str = "$default_instance";

/// 라이브러리 식별자 (`X-Client-Library` 헤더, `sdk.<name>.version` 태그)
pub const DEFAULT_LIBRARY_NAME: &str = "diagkit-rust";

/// 원격 설정에서 진단 설정이 위치한 점 구분 경로
pub const DEFAULT_REMOTE_CONFIG_KEY: &str = "diagnostics.rustSDK";

// ============================================================
// 서버 리전
// ============================================================

/// 데이터 수집 리전
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerZone {
    /// 미국 리전
    #[default]
    US,
    /// 유럽 리전
    EU,
}

impl ServerZone {
    /// 원격 설정 조회 기본 URL
    pub fn remote_config_base_url(&self) -> &'static str {
        match self {
            Self::US => "https://sr-client-cfg.amplitude.com/config",
            Self::EU => "https://sr-client-cfg.eu.amplitude.com/config",
        }
    }

    /// 진단 업로드 기본 URL (`/v1/capture` 경로는 업로더가 붙인다)
    pub fn diagnostics_base_url(&self) -> &'static str {
        match self {
            Self::US => "https://diagnostics.prod.us-west-2.amplitude.com",
            Self::EU => "https://diagnostics.prod.eu-central-1.amplitude.com",
        }
    }
}

// ============================================================
// 원격 설정 재시도 정책
// ============================================================

/// 원격 설정 조회 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfigSettings {
    /// 마지막 성공 조회 후 재조회를 건너뛰는 최소 간격 (초)
    #[serde(default = "default_min_refresh_interval_secs")]
    pub min_refresh_interval_secs: u64,
    /// 최초 시도 이후 재시도 횟수
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 지수 백오프 기준 시간 (밀리초)
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// 요청 타임아웃 (밀리초)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for RemoteConfigSettings {
    fn default() -> Self {
        Self {
            min_refresh_interval_secs: default_min_refresh_interval_secs(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl RemoteConfigSettings {
    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.min_refresh_interval_secs)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ============================================================
// 최상위 진단 설정
// ============================================================

/// 진단 클라이언트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// 프로젝트 API 키
    #[serde(default)]
    pub api_key: String,
    /// 인스턴스 이름 (저장소 디렉토리 해시 입력)
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
    /// 서버 리전
    #[serde(default)]
    pub server_zone: ServerZone,
    /// 업로드 기본 URL 재정의
    #[serde(default)]
    pub server_url: Option<String>,
    /// 원격 설정 기본 URL 재정의
    #[serde(default)]
    pub remote_config_url: Option<String>,
    /// 원격 설정 구독 키 경로
    #[serde(default = "default_remote_config_key")]
    pub remote_config_key: String,
    /// 진단 수집 활성화 여부
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 세션 샘플링 비율 (0.0 ~ 1.0)
    #[serde(default)]
    pub sample_rate: f64,
    /// 크래시 캡처 활성화 여부
    #[serde(default = "default_true")]
    pub crash_capture_enabled: bool,
    /// 업로드 플러시 주기 (초)
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    /// 디스크 영속화 배치 주기 (밀리초)
    #[serde(default = "default_persist_interval_ms")]
    pub persist_interval_ms: u64,
    /// 저장소 루트 재정의 (없으면 플랫폼 지원 디렉토리)
    #[serde(default)]
    pub storage_root: Option<PathBuf>,
    /// 호스트 앱 버전 (`version_name` 태그)
    #[serde(default)]
    pub app_version: Option<String>,
    /// 호스트 앱 번들 식별자 (`X-Client-Bundle-Id` 헤더)
    #[serde(default)]
    pub bundle_id: Option<String>,
    /// 라이브러리 이름
    #[serde(default = "default_library_name")]
    pub library: String,
    /// 원격 설정 조회 정책
    #[serde(default)]
    pub remote_config: RemoteConfigSettings,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl DiagnosticsConfig {
    /// 기본 설정 생성
    pub fn default_config() -> Self {
        Self {
            api_key: String::new(),
            instance_name: default_instance_name(),
            server_zone: ServerZone::default(),
            server_url: None,
            remote_config_url: None,
            remote_config_key: default_remote_config_key(),
            enabled: true,
            sample_rate: 0.0,
            crash_capture_enabled: true,
            flush_interval_secs: default_flush_interval_secs(),
            persist_interval_ms: default_persist_interval_ms(),
            storage_root: None,
            app_version: None,
            bundle_id: None,
            library: default_library_name(),
            remote_config: RemoteConfigSettings::default(),
        }
    }

    /// API 키만 지정한 설정
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default_config()
        }
    }

    /// 업로드 엔드포인트 (`<base>/v1/capture`)
    pub fn upload_url(&self) -> String {
        let base = self
            .server_url
            .as_deref()
            .unwrap_or_else(|| self.server_zone.diagnostics_base_url());
        format!("{}/v1/capture", base.trim_end_matches('/'))
    }

    /// 원격 설정 조회 기본 URL
    pub fn remote_config_base_url(&self) -> &str {
        self.remote_config_url
            .as_deref()
            .unwrap_or_else(|| self.server_zone.remote_config_base_url())
    }

    /// 비어 있으면 기본 인스턴스 이름으로 대체
    pub fn effective_instance_name(&self) -> &str {
        if self.instance_name.trim().is_empty() {
            DEFAULT_INSTANCE_NAME
        } else {
            &self.instance_name
        }
    }

    /// [0, 1] 범위로 보정된 샘플링 비율
    pub fn clamped_sample_rate(&self) -> f64 {
        clamp_sample_rate(self.sample_rate)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_millis(self.persist_interval_ms)
    }
}

/// 샘플링 비율을 [0, 1]로 보정한다. NaN은 0으로 취급.
pub fn clamp_sample_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        0.0
    } else {
        rate.clamp(0.0, 1.0)
    }
}

// ============================================================
// serde 기본값 함수
// ============================================================

fn default_true() -> bool {
    true
}

fn default_instance_name() -> String {
    DEFAULT_INSTANCE_NAME.to_string()
}

fn default_remote_config_key() -> String {
    DEFAULT_REMOTE_CONFIG_KEY.to_string()
}

fn default_library_name() -> String {
    DEFAULT_LIBRARY_NAME.to_string()
}

fn default_flush_interval_secs() -> u64 {
    300
}

fn default_persist_interval_ms() -> u64 {
    1_000
}

fn default_min_refresh_interval_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    8_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DiagnosticsConfig::default_config();
        assert_eq!(config.flush_interval(), Duration::from_secs(300));
        assert_eq!(config.persist_interval(), Duration::from_secs(1));
        assert_eq!(config.remote_config.max_retries, 3);
        assert_eq!(config.remote_config.min_refresh_interval_secs, 300);
        assert!(config.enabled);
        assert_eq!(config.sample_rate, 0.0);
    }

    #[test]
    fn upload_url_by_zone() {
        let mut config = DiagnosticsConfig::with_api_key("key");
        assert_eq!(
            config.upload_url(),
            "https://diagnostics.prod.us-west-2.amplitude.com/v1/capture"
        );

        config.server_zone = ServerZone::EU;
        assert_eq!(
            config.upload_url(),
            "https://diagnostics.prod.eu-central-1.amplitude.com/v1/capture"
        );

        config.server_url = Some("http://127.0.0.1:9000/".to_string());
        assert_eq!(config.upload_url(), "http://127.0.0.1:9000/v1/capture");
    }

    #[test]
    fn sample_rate_is_clamped() {
        assert_eq!(clamp_sample_rate(1.5), 1.0);
        assert_eq!(clamp_sample_rate(-0.2), 0.0);
        assert_eq!(clamp_sample_rate(f64::NAN), 0.0);
        assert_eq!(clamp_sample_rate(0.25), 0.25);
    }

    #[test]
    fn blank_instance_name_falls_back() {
        let mut config = DiagnosticsConfig::default_config();
        config.instance_name = "  ".to_string();
        assert_eq!(config.effective_instance_name(), DEFAULT_INSTANCE_NAME);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: DiagnosticsConfig =
            serde_json::from_str(r#"{"api_key":"abc","server_zone":"EU"}"#).unwrap();
        assert_eq!(config.api_key, "abc");
        assert_eq!(config.server_zone, ServerZone::EU);
        assert_eq!(config.library, DEFAULT_LIBRARY_NAME);
        assert_eq!(config.remote_config.retry_base_ms, 8_000);
    }
}
