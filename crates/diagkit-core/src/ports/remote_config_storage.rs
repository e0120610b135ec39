//! 원격 설정 캐시 포트.

use crate::models::remote_config::RemoteConfigInfo;
use async_trait::async_trait;

/// 원격 설정 캐시 저장소
///
/// 읽기 실패나 디코딩 실패는 캐시 없음(`None`)으로 취급한다.
#[async_trait]
pub trait RemoteConfigStorage: Send + Sync {
    /// 캐시된 설정 조회
    async fn fetch_config(&self) -> Option<RemoteConfigInfo>;

    /// 캐시 교체. `None`이면 삭제.
    async fn set_config(&self, info: Option<RemoteConfigInfo>);
}
