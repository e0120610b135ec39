//! diagkit 핵심 에러 타입.
//!
//! 어댑터 crate는 외부 라이브러리 에러를 `CoreError`로 변환해 반환한다.
//! 진단 파이프라인의 공개 변경 연산은 에러를 로그로 남기고 삼키며,
//! 생성자나 업로더처럼 실패가 의미 있는 경계에서만 `Result`를 돌려준다.

use thiserror::Error;

/// 코어 레이어 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// 네트워크 에러 (연결 실패, 타임아웃)
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 2xx가 아닌 HTTP 응답
    #[error("HTTP {status} 응답: {body}")]
    Http {
        /// 상태 코드
        status: u16,
        /// 응답 본문 (없으면 빈 문자열)
        body: String,
    },

    /// 크래시 리포터 등록/해제 실패
    #[error("크래시 리포터 에러: {0}")]
    CrashReporter(String),

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CoreError = io.into();
        assert!(matches!(err, CoreError::Io(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn http_error_message_contains_status() {
        let err = CoreError::Http {
            status: 503,
            body: "busy".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 503 응답: busy");
    }
}
