//! # diagkit-core
//!
//! 진단 파이프라인의 도메인 모델, 포트(trait) 정의, 에러 타입.
//! 모든 어댑터 크레이트가 공유하는 핵심 타입과 인터페이스를 제공한다.
//!
//! ## 구조
//!
//! - [`models`]: 원격 설정 트리, 진단 스냅샷/페이로드 (serde)
//! - [`ports`]: 어댑터 포트 인터페이스 (async_trait)
//! - [`error`]: 핵심 에러 타입 (thiserror)
//! - [`config`]: 진단 설정 구조체
//! - [`config_manager`]: 설정 파일/환경변수 로드
//! - [`sampler`]: 결정적 세션 샘플링
//! - [`version`]: 버전 문자열 비교

pub mod config;
pub mod config_manager;
pub mod error;
pub mod models;
pub mod ports;
pub mod sampler;
pub mod version;

/// 라이브러리 버전 (`X-Client-Library`, `sdk.<name>.version` 태그)
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");
