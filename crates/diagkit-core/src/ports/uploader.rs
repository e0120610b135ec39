//! 진단 업로드 포트.

use crate::error::CoreError;
use crate::models::diagnostics::DiagnosticsSnapshot;
use async_trait::async_trait;

/// 진단 스냅샷 업로더
///
/// 재시도하지 않는다. 실패 시 호출자는 로그만 남기고 데이터를 버린다.
#[async_trait]
pub trait DiagnosticsUploader: Send + Sync {
    /// 스냅샷 1건 업로드. `sample_rate`는 `X-Client-Sample-Rate` 헤더로 전달된다.
    async fn upload(&self, snapshot: &DiagnosticsSnapshot, sample_rate: f64) -> Result<(), CoreError>;
}
