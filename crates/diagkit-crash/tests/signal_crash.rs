//! 실제 시그널로 프로세스를 종료시키는 통합 테스트.
//!
//! 테스트 바이너리를 자식 프로세스로 다시 실행해, 자식이 핸들러를 등록하고
//! SIGABRT를 일으키면 부모가 종료 상태와 리포트 파일을 확인한다.

#![cfg(unix)]

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Command;

use diagkit_core::ports::crash_reporter::CrashReporter;
use diagkit_crash::{default_report_path, SignalCrashCatcher};
use tempfile::TempDir;

const CHILD_REPORT_ENV: &str = "DIAGKIT_CRASH_CHILD_REPORT";

fn crash_child(report_path: PathBuf) -> ! {
    let catcher = SignalCrashCatcher::new(report_path);
    catcher.register().unwrap();
    unsafe {
        libc::raise(libc::SIGABRT);
    }
    unreachable!("SIGABRT 이후 프로세스가 살아 있음");
}

#[tokio::test]
async fn abort_writes_report_then_next_launch_reads_it() {
    if let Ok(path) = std::env::var(CHILD_REPORT_ENV) {
        crash_child(PathBuf::from(path));
    }

    let temp = TempDir::new().unwrap();
    let report_path = default_report_path(temp.path());

    let status = Command::new(std::env::current_exe().unwrap())
        .args([
            "--exact",
            "abort_writes_report_then_next_launch_reads_it",
            "--test-threads=1",
            "--nocapture",
        ])
        .env(CHILD_REPORT_ENV, &report_path)
        .status()
        .unwrap();

    assert_eq!(status.signal(), Some(libc::SIGABRT));

    let text = std::fs::read_to_string(&report_path).unwrap();
    assert!(text.starts_with("Fatal Signal: SIGABRT (6)"), "{text}");
    assert!(text.contains(" - code: "));
    assert!(text.contains("\nCall Stack:\n"));
    assert!(text.contains("\nBinary Images:\n"));

    // 다음 실행
    let catcher = SignalCrashCatcher::new(report_path.clone());
    let report = catcher.check_for_previous_crash().await.unwrap();
    assert_eq!(report, text);

    catcher.clear_crash_report().await;
    assert!(catcher.check_for_previous_crash().await.is_none());
    assert!(!report_path.exists());
}
