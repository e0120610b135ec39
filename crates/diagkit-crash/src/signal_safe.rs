//! 시그널 핸들러 안에서 쓰는 할당 없는 포매터.
//!
//! 모든 버퍼는 고정 크기 배열이며, 넘치는 입력은 조용히 잘린다.
//! 힙 할당, 잠금, 재진입 불가능한 라이브러리 호출을 하지 않는다.

use std::fmt;
use std::os::raw::{c_char, c_int};

/// 고정 크기 바이트 버퍼
pub struct FixedBuf<const N: usize> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> FixedBuf<N> {
    pub const fn new() -> Self {
        Self { buf: [0; N], len: 0 }
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        let room = N - self.len;
        let take = bytes.len().min(room);
        self.buf[self.len..self.len + take].copy_from_slice(&bytes[..take]);
        self.len += take;
    }

    pub fn push_str(&mut self, text: &str) {
        self.push_bytes(text.as_bytes());
    }

    /// 부호 없는 10진수
    pub fn push_u64(&mut self, value: u64) {
        let mut digits = [0u8; 20];
        let mut pos = digits.len();
        let mut rest = value;
        loop {
            pos -= 1;
            digits[pos] = b'0' + (rest % 10) as u8;
            rest /= 10;
            if rest == 0 {
                break;
            }
        }
        self.push_bytes(&digits[pos..]);
    }

    /// 부호 있는 10진수
    pub fn push_i64(&mut self, value: i64) {
        if value < 0 {
            self.push_bytes(b"-");
        }
        self.push_u64(value.unsigned_abs());
    }

    /// `0x` 접두 16진수. `min_width`보다 짧으면 0으로 채운다.
    pub fn push_hex(&mut self, value: u64, min_width: usize) {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut digits = [0u8; 16];
        let mut pos = digits.len();
        let mut rest = value;
        loop {
            pos -= 1;
            digits[pos] = HEX[(rest & 0xf) as usize];
            rest >>= 4;
            if rest == 0 {
                break;
            }
        }

        self.push_bytes(b"0x");
        let width = digits.len() - pos;
        for _ in width..min_width.min(16) {
            self.push_bytes(b"0");
        }
        self.push_bytes(&digits[pos..]);
    }
}

impl<const N: usize> Default for FixedBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// `write!` 지원 (디맹글러 출력용). 넘쳐도 에러를 내지 않는다.
impl<const N: usize> fmt::Write for FixedBuf<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s);
        Ok(())
    }
}

/// NUL 종료 C 문자열을 최대 `max` 바이트까지 슬라이스로 본다.
///
/// # Safety
/// `ptr`는 null이거나 유효한 NUL 종료 문자열이어야 한다.
pub unsafe fn c_str_bytes<'a>(ptr: *const c_char, max: usize) -> &'a [u8] {
    if ptr.is_null() {
        return &[];
    }
    let mut len = 0;
    while len < max && *ptr.add(len) != 0 {
        len += 1;
    }
    std::slice::from_raw_parts(ptr.cast::<u8>(), len)
}

/// 경로의 마지막 `/` 뒤 부분
pub fn basename(path: &[u8]) -> &[u8] {
    match path.iter().rposition(|&b| b == b'/') {
        Some(pos) => &path[pos + 1..],
        None => path,
    }
}

/// 부분 쓰기와 EINTR을 처리하는 raw `write()`
pub fn write_all(fd: c_int, mut bytes: &[u8]) {
    while !bytes.is_empty() {
        // SAFETY: 유효한 슬라이스 포인터/길이로 호출
        let written = unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
        if written > 0 {
            bytes = &bytes[written as usize..];
            continue;
        }
        if written < 0 && std::io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        break;
    }
}
