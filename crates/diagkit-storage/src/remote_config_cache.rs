//! 원격 설정 캐시 저장소: 파일/메모리 구현.

use async_trait::async_trait;
use diagkit_core::models::remote_config::{normalize_config, RemoteConfigInfo};
use diagkit_core::ports::remote_config_storage::RemoteConfigStorage;
use diagkit_core::sampler::fnv1a64;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::session_files::{read_json, remove_file_if_exists, write_json_atomic};

/// 캐시 파일이 놓이는 네임스페이스
pub const CACHE_NAMESPACE: &str = "diagkit.remoteconfig";

/// 인스턴스별 JSON 파일 캐시
///
/// 구조: `<root>/diagkit.remoteconfig/<fnv1a64(instance)>.json`
pub struct FileRemoteConfigStorage {
    path: PathBuf,
    /// 파일 교체 직렬화
    write_lock: tokio::sync::Mutex<()>,
}

impl FileRemoteConfigStorage {
    pub fn new(root: &Path, instance_name: &str) -> Self {
        let path = root
            .join(CACHE_NAMESPACE)
            .join(format!("{:016x}.json", fnv1a64(instance_name)));
        Self {
            path,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RemoteConfigStorage for FileRemoteConfigStorage {
    async fn fetch_config(&self) -> Option<RemoteConfigInfo> {
        let info: RemoteConfigInfo = read_json(&self.path).await?;
        Some(RemoteConfigInfo {
            config: normalize_config(info.config),
            last_fetch: info.last_fetch,
        })
    }

    async fn set_config(&self, info: Option<RemoteConfigInfo>) {
        let _guard = self.write_lock.lock().await;
        let result = match (&info, self.path.parent(), self.path.file_name()) {
            (Some(info), Some(dir), Some(name)) => {
                write_json_atomic(dir, &name.to_string_lossy(), info).await
            }
            (None, _, _) => remove_file_if_exists(&self.path).await,
            _ => return,
        };

        match result {
            Ok(()) => debug!("원격 설정 캐시 갱신: {}", self.path.display()),
            Err(e) => warn!("원격 설정 캐시 저장 실패: {}: {e}", self.path.display()),
        }
    }
}

/// 프로세스 메모리 캐시
#[derive(Default)]
pub struct MemoryRemoteConfigStorage {
    info: Mutex<Option<RemoteConfigInfo>>,
}

impl MemoryRemoteConfigStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 초기 캐시 값을 가진 저장소
    pub fn with_config(info: RemoteConfigInfo) -> Self {
        Self {
            info: Mutex::new(Some(info)),
        }
    }
}

#[async_trait]
impl RemoteConfigStorage for MemoryRemoteConfigStorage {
    async fn fetch_config(&self) -> Option<RemoteConfigInfo> {
        self.info.lock().clone()
    }

    async fn set_config(&self, info: Option<RemoteConfigInfo>) {
        *self.info.lock() = info;
    }
}
