//! 공통 HTTP 요청 빌더.
//!
//! 모든 요청에 고정 클라이언트 헤더(콘텐츠 타입, 버전, 라이브러리, 플랫폼, 번들 ID)를 붙이고
//! 2xx가 아닌 응답을 `CoreError::Http`로 매핑한다.

use diagkit_core::config::DiagnosticsConfig;
use diagkit_core::error::CoreError;
use diagkit_core::LIBRARY_VERSION;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::Duration;
use tracing::warn;

/// 클라이언트 프로토콜 버전 (`X-Client-Version`)
const CLIENT_PROTOCOL_VERSION: &str = "2";

/// 고정 클라이언트 헤더 값
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHeaders {
    /// `<library>/<version>`
    pub library: String,
    pub platform: String,
    pub bundle_id: Option<String>,
}

impl ClientHeaders {
    pub fn new(library: &str, platform: impl Into<String>, bundle_id: Option<String>) -> Self {
        Self {
            library: format!("{library}/{LIBRARY_VERSION}"),
            platform: platform.into(),
            bundle_id,
        }
    }

    /// 설정에서 헤더 구성. 플랫폼은 호스트 OS 이름.
    pub fn from_config(config: &DiagnosticsConfig) -> Self {
        Self::new(
            &config.library,
            std::env::consts::OS,
            config.bundle_id.clone(),
        )
    }
}

/// 고정 헤더를 주입하는 HTTP 클라이언트 래퍼
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    headers: ClientHeaders,
}

impl HttpClient {
    /// 새 HTTP 클라이언트 생성
    pub fn new(headers: ClientHeaders, timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {e}")))?;

        Ok(Self { client, headers })
    }

    pub fn headers(&self) -> &ClientHeaders {
        &self.headers
    }

    /// 고정 헤더가 포함된 JSON 요청 빌더 반환
    pub fn json_request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(method, url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "*/*")
            .header("X-Client-Version", CLIENT_PROTOCOL_VERSION)
            .header("X-Client-Library", &self.headers.library)
            .header("X-Client-Platform", &self.headers.platform);

        if let Some(bundle_id) = &self.headers.bundle_id {
            request = request.header("X-Client-Bundle-Id", bundle_id);
        }
        request
    }
}

/// 응답 상태 코드 확인. 2xx가 아니면 본문과 함께 에러 반환.
pub async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, CoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_else(|e| {
        warn!("응답 본문 읽기 실패: {e}");
        String::new()
    });

    Err(CoreError::Http {
        status: status.as_u16(),
        body,
    })
}
