//! POSIX 시그널 기반 크래시 캐처.
//!
//! 치명적 시그널이 들어오면 고정 경로 파일에 리포트를 한 번 기록하고,
//! 이전 핸들러로 체이닝한 뒤 기본 동작으로 재발생시켜 프로세스를 종료한다.
//! 다음 실행에서 `check_for_previous_crash`가 그 파일을 읽는다.
//!
//! 핸들러 상태는 프로세스 전역이다. 여러 인스턴스가 등록해도 첫 등록의
//! 리포트 경로가 유지된다.

use std::cell::UnsafeCell;
use std::fmt::Write as _;
use std::os::raw::{c_char, c_int, c_void};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use diagkit_core::error::CoreError;
use diagkit_core::ports::crash_reporter::CrashReporter;

use crate::signal_safe::{basename, c_str_bytes, write_all, FixedBuf};

// ============================================================
// 상수
// ============================================================

const FATAL_SIGNALS: [c_int; 7] = [
    libc::SIGABRT,
    libc::SIGILL,
    libc::SIGSEGV,
    libc::SIGFPE,
    libc::SIGBUS,
    libc::SIGPIPE,
    libc::SIGTRAP,
];

const MAX_FRAMES: usize = 64;
const MAX_IMAGES: usize = 64;
const MAX_PATH: usize = 1024;
const IMAGE_NAME_LIMIT: usize = 40;
const SYMBOL_NAME_LIMIT: usize = 120;
const LINE_CAPACITY: usize = 512;

fn signal_name(signal: c_int) -> &'static str {
    match signal {
        libc::SIGABRT => "SIGABRT",
        libc::SIGILL => "SIGILL",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGFPE => "SIGFPE",
        libc::SIGBUS => "SIGBUS",
        libc::SIGPIPE => "SIGPIPE",
        libc::SIGTRAP => "SIGTRAP",
        _ => "UNKNOWN",
    }
}

// ============================================================
// 전역 핸들러 상태
// ============================================================

/// 시그널 핸들러에서 접근하는 전역 셀.
///
/// 쓰기는 `REGISTRATION` 잠금 아래에서만, 핸들러 안의 쓰기는
/// `HANDLING` 플래그를 먼저 잡은 스레드만 한다.
struct SignalCell<T>(UnsafeCell<T>);

unsafe impl<T> Sync for SignalCell<T> {}

struct HandlerState {
    /// NUL 종료 리포트 경로
    report_path: [u8; MAX_PATH],
    previous: [Option<libc::sigaction>; FATAL_SIGNALS.len()],
    frames: [*mut c_void; MAX_FRAMES],
    images: [ImageEntry; MAX_IMAGES],
}

#[derive(Clone, Copy)]
struct ImageEntry {
    base: usize,
    name: *const c_char,
}

impl ImageEntry {
    const EMPTY: Self = Self {
        base: 0,
        name: ptr::null(),
    };
}

static STATE: SignalCell<HandlerState> = SignalCell(UnsafeCell::new(HandlerState {
    report_path: [0; MAX_PATH],
    previous: [None; FATAL_SIGNALS.len()],
    frames: [ptr::null_mut(); MAX_FRAMES],
    images: [ImageEntry::EMPTY; MAX_IMAGES],
}));

static REGISTRATION: parking_lot::Mutex<()> = parking_lot::const_mutex(());
static INSTALLED: AtomicBool = AtomicBool::new(false);
static HANDLING: AtomicBool = AtomicBool::new(false);

// ============================================================
// 스택 수집
// ============================================================

#[cfg(any(
    all(target_os = "linux", target_env = "gnu"),
    target_os = "macos",
    target_os = "ios"
))]
mod frames {
    use std::os::raw::{c_int, c_void};

    extern "C" {
        fn backtrace(buffer: *mut *mut c_void, size: c_int) -> c_int;
    }

    pub fn capture(buffer: &mut [*mut c_void]) -> usize {
        // SAFETY: 버퍼 길이만큼만 채운다
        let count = unsafe { backtrace(buffer.as_mut_ptr(), buffer.len() as c_int) };
        count.max(0) as usize
    }
}

#[cfg(not(any(
    all(target_os = "linux", target_env = "gnu"),
    target_os = "macos",
    target_os = "ios"
)))]
mod frames {
    use std::os::raw::c_void;

    pub fn capture(_buffer: &mut [*mut c_void]) -> usize {
        0
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn fault_address(info: *const libc::siginfo_t) -> u64 {
    (*info).si_addr() as u64
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
unsafe fn fault_address(info: *const libc::siginfo_t) -> u64 {
    (*info).si_addr as u64
}

// ============================================================
// 리포트 기록
// ============================================================

/// 리포트 파일 전체를 기록한다.
///
/// # Safety
/// `path`는 NUL 종료 문자열, `info`는 null이거나 커널이 넘긴 siginfo여야 한다.
unsafe fn write_report(
    path: *const c_char,
    signal: c_int,
    info: *const libc::siginfo_t,
    frame_buf: &mut [*mut c_void],
    images: &mut [ImageEntry],
) {
    let fd = libc::open(
        path,
        libc::O_CREAT | libc::O_WRONLY | libc::O_TRUNC | libc::O_CLOEXEC,
        0o644 as libc::c_uint,
    );
    if fd < 0 {
        return;
    }

    let mut line = FixedBuf::<LINE_CAPACITY>::new();
    line.push_str("Fatal Signal: ");
    line.push_str(signal_name(signal));
    line.push_str(" (");
    line.push_i64(signal as i64);
    line.push_str(")");
    if !info.is_null() {
        line.push_str(" - code: ");
        line.push_i64((*info).si_code as i64);
        line.push_str(", address: ");
        line.push_hex(fault_address(info), 0);
    }
    line.push_str("\n");
    write_all(fd, line.as_bytes());

    write_all(fd, b"\nCall Stack:\n");
    let count = frames::capture(frame_buf);
    let mut image_count = 0;

    for (index, &address) in frame_buf[..count].iter().enumerate() {
        line.clear();
        line.push_str("  ");
        line.push_u64(index as u64);
        line.push_str("  ");

        let mut dl: libc::Dl_info = std::mem::zeroed();
        if libc::dladdr(address as *const c_void, &mut dl) != 0 {
            let image = basename(c_str_bytes(dl.dli_fname, MAX_PATH));
            line.push_bytes(&image[..image.len().min(IMAGE_NAME_LIMIT)]);
            line.push_str("  ");
            line.push_hex(address as u64, 16);
            line.push_str("  ");
            if dl.dli_sname.is_null() {
                line.push_str("<unknown>");
            } else {
                push_symbol(&mut line, c_str_bytes(dl.dli_sname, LINE_CAPACITY));
                line.push_str(" + ");
                line.push_u64((address as u64).wrapping_sub(dl.dli_saddr as u64));
            }

            let base = dl.dli_fbase as usize;
            let known = images[..image_count].iter().any(|entry| entry.base == base);
            if !known && image_count < images.len() {
                images[image_count] = ImageEntry {
                    base,
                    name: dl.dli_fname,
                };
                image_count += 1;
            }
        } else {
            line.push_str("???  ");
            line.push_hex(address as u64, 16);
            line.push_str("  <unknown>");
        }
        line.push_str("\n");
        write_all(fd, line.as_bytes());
    }

    write_all(fd, b"\nBinary Images:\n");
    for entry in &images[..image_count] {
        line.clear();
        line.push_hex(entry.base as u64, 16);
        line.push_str("  ");
        line.push_bytes(c_str_bytes(entry.name, MAX_PATH));
        line.push_str("\n");
        write_all(fd, line.as_bytes());
    }

    libc::fsync(fd);
    libc::close(fd);
}

/// 심볼 이름 (Rust 심볼은 디맹글, 길이 제한)
fn push_symbol<const N: usize>(line: &mut FixedBuf<N>, raw: &[u8]) {
    let mut symbol = FixedBuf::<SYMBOL_NAME_LIMIT>::new();
    match std::str::from_utf8(raw).ok().map(rustc_demangle::try_demangle) {
        Some(Ok(demangled)) => {
            let _ = write!(symbol, "{demangled:#}");
        }
        _ => symbol.push_bytes(raw),
    }
    line.push_bytes(symbol.as_bytes());
}

// ============================================================
// 시그널 핸들러
// ============================================================

extern "C" fn handle_fatal_signal(signal: c_int, info: *mut libc::siginfo_t, context: *mut c_void) {
    // 첫 시그널만 기록
    if !HANDLING.swap(true, Ordering::SeqCst) {
        // SAFETY: HANDLING을 잡은 스레드만 여기 도달한다
        unsafe {
            let state = &mut *STATE.0.get();
            write_report(
                state.report_path.as_ptr().cast(),
                signal,
                info,
                &mut state.frames,
                &mut state.images,
            );
        }
    }

    // SAFETY: 저장해 둔 sigaction만 호출, 이후 기본 동작으로 재발생
    unsafe {
        chain_previous(signal, info, context);

        let mut default_action: libc::sigaction = std::mem::zeroed();
        default_action.sa_sigaction = libc::SIG_DFL;
        libc::sigemptyset(&mut default_action.sa_mask);
        libc::sigaction(signal, &default_action, ptr::null_mut());
        libc::raise(signal);
    }
}

unsafe fn chain_previous(signal: c_int, info: *mut libc::siginfo_t, context: *mut c_void) {
    let state = &*STATE.0.get();
    let Some(index) = FATAL_SIGNALS.iter().position(|&s| s == signal) else {
        return;
    };
    let Some(previous) = state.previous[index] else {
        return;
    };

    let handler = previous.sa_sigaction;
    if handler == libc::SIG_DFL || handler == libc::SIG_IGN {
        return;
    }

    if previous.sa_flags & libc::SA_SIGINFO != 0 {
        let action: extern "C" fn(c_int, *mut libc::siginfo_t, *mut c_void) =
            std::mem::transmute(handler);
        action(signal, info, context);
    } else {
        let action: extern "C" fn(c_int) = std::mem::transmute(handler);
        action(signal);
    }
}

// ============================================================
// 설치 / 해제
// ============================================================

fn install(report_path: &Path) -> Result<(), CoreError> {
    let _guard = REGISTRATION.lock();
    if INSTALLED.load(Ordering::SeqCst) {
        debug!("크래시 핸들러 이미 설치됨");
        return Ok(());
    }

    let path_bytes = report_path.as_os_str().as_bytes();
    if path_bytes.is_empty() || path_bytes.len() >= MAX_PATH || path_bytes.contains(&0) {
        return Err(CoreError::CrashReporter(format!(
            "사용할 수 없는 리포트 경로: {}",
            report_path.display()
        )));
    }
    if let Some(parent) = report_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // backtrace()의 지연 로딩을 핸들러 밖에서 끝낸다
    let mut warm: [*mut c_void; 4] = [ptr::null_mut(); 4];
    frames::capture(&mut warm);

    // SAFETY: REGISTRATION 잠금 중이며 핸들러는 아직 설치되지 않았다
    unsafe {
        let state = &mut *STATE.0.get();
        state.report_path = [0; MAX_PATH];
        state.report_path[..path_bytes.len()].copy_from_slice(path_bytes);

        for (index, &signal) in FATAL_SIGNALS.iter().enumerate() {
            state.previous[index] = None;

            let mut previous: libc::sigaction = std::mem::zeroed();
            if libc::sigaction(signal, ptr::null(), &mut previous) != 0 {
                warn!("시그널 조회 실패: {}", signal_name(signal));
                continue;
            }
            // 무시 중인 시그널(예: Rust 런타임의 SIGPIPE)은 건드리지 않는다
            if previous.sa_sigaction == libc::SIG_IGN {
                continue;
            }

            let handler: extern "C" fn(c_int, *mut libc::siginfo_t, *mut c_void) =
                handle_fatal_signal;
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = handler as libc::sighandler_t;
            action.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK;
            libc::sigemptyset(&mut action.sa_mask);

            if libc::sigaction(signal, &action, ptr::null_mut()) != 0 {
                warn!("시그널 핸들러 설치 실패: {}", signal_name(signal));
                continue;
            }
            state.previous[index] = Some(previous);
        }
    }

    HANDLING.store(false, Ordering::SeqCst);
    INSTALLED.store(true, Ordering::SeqCst);
    info!("크래시 핸들러 설치: {}", report_path.display());
    Ok(())
}

fn uninstall() -> Result<(), CoreError> {
    let _guard = REGISTRATION.lock();
    if !INSTALLED.load(Ordering::SeqCst) {
        return Ok(());
    }

    // SAFETY: REGISTRATION 잠금 중
    unsafe {
        let state = &mut *STATE.0.get();
        for (index, &signal) in FATAL_SIGNALS.iter().enumerate() {
            if let Some(previous) = state.previous[index].take() {
                if libc::sigaction(signal, &previous, ptr::null_mut()) != 0 {
                    warn!("시그널 핸들러 복원 실패: {}", signal_name(signal));
                }
            }
        }
    }

    INSTALLED.store(false, Ordering::SeqCst);
    info!("크래시 핸들러 해제");
    Ok(())
}

// ============================================================
// SignalCrashCatcher
// ============================================================

/// 시그널 핸들러로 크래시를 잡는 `CrashReporter` 구현
pub struct SignalCrashCatcher {
    report_path: PathBuf,
}

impl SignalCrashCatcher {
    pub fn new(report_path: PathBuf) -> Self {
        Self { report_path }
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }
}

#[async_trait]
impl CrashReporter for SignalCrashCatcher {
    fn register(&self) -> Result<(), CoreError> {
        install(&self.report_path)
    }

    fn unregister(&self) -> Result<(), CoreError> {
        uninstall()
    }

    fn is_registered(&self) -> bool {
        INSTALLED.load(Ordering::SeqCst)
    }

    async fn check_for_previous_crash(&self) -> Option<String> {
        match tokio::fs::read(&self.report_path).await {
            Ok(bytes) if bytes.is_empty() => None,
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("크래시 리포트 읽기 실패: {e}");
                None
            }
        }
    }

    async fn clear_crash_report(&self) {
        match tokio::fs::remove_file(&self.report_path).await {
            Ok(()) => debug!("크래시 리포트 삭제: {}", self.report_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("크래시 리포트 삭제 실패: {e}"),
        }
    }
}
