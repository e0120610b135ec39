//! NoOp 크래시 리포터.
//!
//! 시그널을 설치하지 않는 폴백 구현.
//! 크래시 수집 비활성 또는 미지원 플랫폼에서 사용.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use diagkit_core::error::CoreError;
use diagkit_core::ports::crash_reporter::CrashReporter;

/// 아무 것도 수집하지 않는 NoOp 크래시 리포터
#[derive(Default)]
pub struct NoOpCrashReporter {
    registered: AtomicBool,
}

impl NoOpCrashReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CrashReporter for NoOpCrashReporter {
    fn register(&self) -> Result<(), CoreError> {
        tracing::debug!("NoOp 크래시 리포터: 등록 무시");
        self.registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn unregister(&self) -> Result<(), CoreError> {
        self.registered.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    async fn check_for_previous_crash(&self) -> Option<String> {
        None
    }

    async fn clear_crash_report(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_never_reports() {
        let reporter = NoOpCrashReporter::new();
        assert!(!reporter.is_registered());

        reporter.register().unwrap();
        assert!(reporter.is_registered());
        assert!(reporter.check_for_previous_crash().await.is_none());

        reporter.unregister().unwrap();
        assert!(!reporter.is_registered());
    }
}
