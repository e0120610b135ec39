//! 크래시 리포터 포트.
//!
//! 시그널 핸들러 설치/해제와 이전 실행의 리포트 회수를 분리한다.
//! 시그널을 지원하지 않는 플랫폼은 no-op 구현을 사용한다.

use crate::error::CoreError;
use async_trait::async_trait;

#[async_trait]
pub trait CrashReporter: Send + Sync {
    /// 치명적 시그널 핸들러 설치 (이미 등록돼 있으면 no-op)
    fn register(&self) -> Result<(), CoreError>;

    /// 저장해둔 이전 핸들러로 복원 (미등록이면 no-op)
    fn unregister(&self) -> Result<(), CoreError>;

    /// 현재 등록 상태
    fn is_registered(&self) -> bool;

    /// 이전 실행이 남긴 크래시 리포트 텍스트
    async fn check_for_previous_crash(&self) -> Option<String>;

    /// 크래시 리포트 파일 삭제
    async fn clear_crash_report(&self);
}
