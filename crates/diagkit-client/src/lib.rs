//! # diagkit-client
//!
//! 진단 파이프라인 진입점.
//!
//! [`DiagnosticsClient`]가 저장소, 원격 설정, 크래시 리포터, 업로더를 묶는다.
//! 세션 샘플링 게이트를 계산하고 플러시 타이머와 업로드를 관리한다.

pub mod client;
pub mod device;

pub use client::{ConfigUpdate, DiagnosticsClient, DiagnosticsClientBuilder};
pub use device::SysInfoDeviceInfo;
