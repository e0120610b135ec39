//! # diagkit-storage
//!
//! 로컬 저장소 어댑터.
//! 세션 단위 진단 데이터의 배치 영속화와 이전 세션 회수,
//! 원격 설정 캐시(파일/메모리)를 관리한다.
//!
//! ## 모듈
//! - `diagnostics_storage`: 세션 진단 저장소
//! - `session_files`: 세션 디렉토리 파일 입출력 (원자적 JSON, 회전 로그)
//! - `remote_config_cache`: `RemoteConfigStorage` 포트 구현

pub mod diagnostics_storage;
pub mod remote_config_cache;
pub mod session_files;

pub use diagnostics_storage::{DiagnosticsStorage, StorageOptions};
pub use remote_config_cache::{FileRemoteConfigStorage, MemoryRemoteConfigStorage};
