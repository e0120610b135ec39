//! 진단 업로더.
//!
//! 스냅샷을 `POST <base>/v1/capture`로 한 번 전송한다. 재시도 없음.

use async_trait::async_trait;
use diagkit_core::config::DiagnosticsConfig;
use diagkit_core::error::CoreError;
use diagkit_core::models::diagnostics::{DiagnosticsPayload, DiagnosticsSnapshot};
use diagkit_core::ports::uploader::DiagnosticsUploader;
use std::time::Duration;
use tracing::debug;

use crate::http_client::{check_response, ClientHeaders, HttpClient};

/// 업로드 요청 타임아웃
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP 진단 업로더: `DiagnosticsUploader` 포트 구현
pub struct HttpDiagnosticsUploader {
    http: HttpClient,
    url: String,
    api_key: String,
}

impl HttpDiagnosticsUploader {
    /// 새 업로더 생성
    pub fn new(http: HttpClient, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    /// 설정의 리전/URL 재정의로 업로더 생성
    pub fn from_config(config: &DiagnosticsConfig) -> Result<Self, CoreError> {
        let http = HttpClient::new(ClientHeaders::from_config(config), UPLOAD_TIMEOUT)?;
        Ok(Self::new(http, config.upload_url(), config.api_key.clone()))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl DiagnosticsUploader for HttpDiagnosticsUploader {
    async fn upload(&self, snapshot: &DiagnosticsSnapshot, sample_rate: f64) -> Result<(), CoreError> {
        let payload = DiagnosticsPayload::from(snapshot);
        let body = serde_json::to_vec(&payload)?;

        let resp = self
            .http
            .json_request(reqwest::Method::POST, &self.url)
            .header("X-ApiKey", &self.api_key)
            .header("X-Client-Sample-Rate", format!("{sample_rate:?}"))
            .body(body)
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("진단 업로드 요청 실패: {e}")))?;

        check_response(resp).await?;
        debug!(
            "진단 업로드 성공: 카운터 {}개, 히스토그램 {}개, 이벤트 {}개",
            payload.counters.len(),
            payload.histogram.len(),
            payload.events.len()
        );
        Ok(())
    }
}
