//! 결정적 세션 샘플링과 인스턴스 이름 해시.
//!
//! 같은 시드는 항상 같은 결과를 낸다. 상태 없음.

const SAMPLE_BUCKETS: u64 = 100_000;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// `seed`가 `rate` 비율 표본에 포함되는지 판정
pub fn is_in_sample(seed: &str, rate: f64) -> bool {
    let scaled = seed_hash(seed).wrapping_mul(31) % SAMPLE_BUCKETS;
    // `as`는 음수/NaN을 0으로, 초과값을 포화시킨다
    scaled < (rate * SAMPLE_BUCKETS as f64) as u64
}

/// UTF-16 코드 유닛 기준 `h * 31 + c` 누적 (64비트 랩어라운드)
fn seed_hash(seed: &str) -> u64 {
    seed.encode_utf16()
        .fold(0i64, |hash, unit| {
            (hash << 5).wrapping_sub(hash).wrapping_add(i64::from(unit))
        }) as u64
}

/// FNV-1a 64비트 해시 (UTF-8 바이트)
pub fn fnv1a64(text: &str) -> u64 {
    text.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}
