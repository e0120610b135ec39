//! 도메인 모델.
//!
//! 원격 설정 트리와 진단 스냅샷/업로드 페이로드를 정의한다.

pub mod diagnostics;
pub mod remote_config;
