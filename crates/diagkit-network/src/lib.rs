//! # diagkit-network
//!
//! 네트워크 어댑터: 원격 설정 조회/구독, 진단 스냅샷 업로드.
//!
//! - [`http_client`]: 고정 클라이언트 헤더를 붙이는 요청 빌더
//! - [`remote_config`]: 재시도/캐시/구독 전달을 담당하는 원격 설정 클라이언트
//! - [`uploader`]: `DiagnosticsUploader` 포트의 HTTP 구현

pub mod http_client;
pub mod remote_config;
pub mod uploader;

pub use http_client::{ClientHeaders, HttpClient};
pub use remote_config::{
    ConfigCallback, RemoteConfigClient, RemoteConfigError, RemoteConfigFetcher,
    SubscriptionToken, DEFAULT_CONFIG_KEYS,
};
pub use uploader::HttpDiagnosticsUploader;
