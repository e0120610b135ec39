//! # diagkit-crash
//!
//! 크래시 리포터 어댑터.
//!
//! - Unix: 치명적 시그널 핸들러 ([`SignalCrashCatcher`])
//! - NoOp: 미지원 플랫폼 또는 비활성 시 폴백
//!
//! 리포트는 세션과 무관한 고정 경로 파일 하나에 기록되고,
//! 다음 실행에서 읽힌 뒤 삭제된다.

mod noop;

#[cfg(unix)]
mod signal_handler;
#[cfg(unix)]
pub mod signal_safe;

pub use noop::NoOpCrashReporter;

#[cfg(unix)]
pub use signal_handler::SignalCrashCatcher;

use diagkit_core::ports::crash_reporter::CrashReporter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 크래시 리포트 디렉토리 이름 (저장소 루트 기준)
pub const CRASH_DIR: &str = "diagkit.crash";

/// 크래시 리포트 파일 이름
pub const CRASH_REPORT_FILE: &str = "crash_report";

/// 저장소 루트 아래 기본 리포트 경로
pub fn default_report_path(storage_root: &Path) -> PathBuf {
    storage_root.join(CRASH_DIR).join(CRASH_REPORT_FILE)
}

/// 현재 플랫폼에 맞는 크래시 리포터 생성
pub fn create_platform_crash_reporter(report_path: PathBuf) -> Arc<dyn CrashReporter> {
    #[cfg(unix)]
    {
        Arc::new(SignalCrashCatcher::new(report_path))
    }

    #[cfg(not(unix))]
    {
        tracing::warn!(
            "미지원 플랫폼: NoOp 크래시 리포터 폴백 ({})",
            report_path.display()
        );
        Arc::new(NoOpCrashReporter::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_path_is_not_session_scoped() {
        let root = Path::new("/tmp/diag");
        assert_eq!(
            default_report_path(root),
            PathBuf::from("/tmp/diag/diagkit.crash/crash_report")
        );
    }
}
