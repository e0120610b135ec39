//! 점 구분 정수 버전 비교 ("x", "x.y", "x.y.z").

use thiserror::Error;

/// 버전 문자열 파싱 에러
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("잘못된 버전 문자열: {0:?}")]
    InvalidVersionString(String),

    #[error("빈 버전 문자열")]
    EmptyVersionString,
}

/// `version >= other` 여부. 부족한 자리는 0으로 본다.
pub fn is_greater_than_or_equal_version(version: &str, other: &str) -> Result<bool, VersionError> {
    let lhs = parse_components(version)?;
    let rhs = parse_components(other)?;

    let len = lhs.len().max(rhs.len());
    for i in 0..len {
        let a = lhs.get(i).copied().unwrap_or(0);
        let b = rhs.get(i).copied().unwrap_or(0);
        if a != b {
            return Ok(a > b);
        }
    }
    Ok(true)
}

fn parse_components(version: &str) -> Result<Vec<i64>, VersionError> {
    if version.is_empty() {
        return Err(VersionError::EmptyVersionString);
    }

    let invalid = || VersionError::InvalidVersionString(version.to_string());

    if version.starts_with('.') || version.ends_with('.') || version.contains("..") {
        return Err(invalid());
    }

    version
        .split('.')
        .map(|part| {
            if part.chars().any(char::is_whitespace) {
                return Err(invalid());
            }
            part.parse::<i64>().map_err(|_| invalid())
        })
        .collect()
}
