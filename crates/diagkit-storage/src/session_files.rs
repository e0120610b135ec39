//! 세션 디렉토리 파일 입출력.
//!
//! 구조: `<session_dir>/{tags.json, counters.json, histograms.json, events.log, events-<ms>.log}`
//!
//! - JSON 파일은 정렬된 키로 통째로 덮어쓴다 (임시 파일 + rename).
//! - `events.log`는 줄 단위 JSON을 덧붙이며, 크기 한도를 넘기 전에 `events-<ms>.log`로 회전한다.
//! - 읽을 때는 회전된 로그(시각순) 다음 현재 로그 순서로 이어 붙인다.

use chrono::Utc;
use diagkit_core::error::CoreError;
use diagkit_core::models::diagnostics::{DiagnosticsEvent, DiagnosticsSnapshot};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

pub const TAGS_FILE: &str = "tags.json";
pub const COUNTERS_FILE: &str = "counters.json";
pub const HISTOGRAMS_FILE: &str = "histograms.json";
pub const EVENTS_LOG_FILE: &str = "events.log";

/// 현재 이벤트 로그 회전 한도 (256 KiB)
pub const MAX_EVENTS_LOG_BYTES: u64 = 256 * 1024;

const ROTATED_PREFIX: &str = "events-";
const ROTATED_SUFFIX: &str = ".log";

/// 정렬된 키의 JSON으로 원자적 덮어쓰기
pub async fn write_json_atomic<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<(), CoreError> {
    fs::create_dir_all(dir).await?;
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = dir.join(format!("{name}.tmp"));
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, dir.join(name)).await?;
    Ok(())
}

/// JSON 파일 읽기. 없거나 손상되었으면 `None`.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("진단 파일 읽기 실패: {}: {e}", path.display());
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("진단 파일 파싱 실패: {}: {e}", path.display());
            None
        }
    }
}

/// 이벤트를 줄 단위 JSON으로 덧붙인다. 한도를 넘게 되면 먼저 회전한다.
pub async fn append_events(dir: &Path, events: &[DiagnosticsEvent], max_bytes: u64) -> Result<(), CoreError> {
    if events.is_empty() {
        return Ok(());
    }
    fs::create_dir_all(dir).await?;
    let live = dir.join(EVENTS_LOG_FILE);

    for event in events {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let size = match fs::metadata(&live).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        if size > 0 && size + line.len() as u64 > max_bytes {
            rotate_events_log(dir, &live).await?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&live)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
    }
    Ok(())
}

async fn rotate_events_log(dir: &Path, live: &Path) -> Result<(), CoreError> {
    let mut millis = Utc::now().timestamp_millis();
    let mut target = dir.join(rotated_name(millis));
    while fs::try_exists(&target).await? {
        millis += 1;
        target = dir.join(rotated_name(millis));
    }
    fs::rename(live, &target).await?;
    debug!("이벤트 로그 회전: {}", target.display());
    Ok(())
}

fn rotated_name(millis: i64) -> String {
    format!("{ROTATED_PREFIX}{millis}{ROTATED_SUFFIX}")
}

/// `events-<ms>.log` 파일명에서 ms 추출
fn rotated_millis(file_name: &str) -> Option<i64> {
    file_name
        .strip_prefix(ROTATED_PREFIX)?
        .strip_suffix(ROTATED_SUFFIX)?
        .parse()
        .ok()
}

/// 회전된 이벤트 로그 목록 (시각 오름차순)
pub async fn rotated_event_logs(dir: &Path) -> Vec<PathBuf> {
    let mut logs: Vec<(i64, PathBuf)> = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Some(millis) = entry.file_name().to_str().and_then(rotated_millis) {
            logs.push((millis, entry.path()));
        }
    }
    logs.sort_by_key(|(millis, _)| *millis);
    logs.into_iter().map(|(_, path)| path).collect()
}

/// 회전된 로그 → 현재 로그 순서로 이벤트 복원. 손상된 줄은 건너뛴다.
pub async fn read_events(dir: &Path) -> Vec<DiagnosticsEvent> {
    let mut paths = rotated_event_logs(dir).await;
    paths.push(dir.join(EVENTS_LOG_FILE));

    let mut events = Vec::new();
    for path in paths {
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                warn!("이벤트 로그 읽기 실패: {}: {e}", path.display());
                continue;
            }
        };
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<DiagnosticsEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => debug!("손상된 이벤트 줄 건너뜀: {e}"),
            }
        }
    }
    events
}

/// 세션 디렉토리 하나를 스냅샷으로 복원
pub async fn read_snapshot(dir: &Path) -> DiagnosticsSnapshot {
    DiagnosticsSnapshot {
        tags: read_json::<BTreeMap<_, _>>(&dir.join(TAGS_FILE))
            .await
            .unwrap_or_default(),
        counters: read_json::<BTreeMap<_, _>>(&dir.join(COUNTERS_FILE))
            .await
            .unwrap_or_default(),
        histograms: read_json::<BTreeMap<_, _>>(&dir.join(HISTOGRAMS_FILE))
            .await
            .unwrap_or_default(),
        events: read_events(dir).await,
    }
}

/// 파일 삭제. 없으면 무시.
pub async fn remove_file_if_exists(path: &Path) -> Result<(), CoreError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// 카운터/히스토그램/이벤트 파일 삭제 (태그 파일은 유지)
pub async fn remove_accumulated_files(dir: &Path) -> Result<(), CoreError> {
    remove_file_if_exists(&dir.join(COUNTERS_FILE)).await?;
    remove_file_if_exists(&dir.join(HISTOGRAMS_FILE)).await?;
    remove_file_if_exists(&dir.join(EVENTS_LOG_FILE)).await?;
    for rotated in rotated_event_logs(dir).await {
        remove_file_if_exists(&rotated).await?;
    }
    Ok(())
}
