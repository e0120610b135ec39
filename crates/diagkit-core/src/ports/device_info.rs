//! 디바이스 정보 포트: 정적 태그용 문자열 제공자.

/// 디바이스/OS 식별 문자열
pub trait DeviceInfoProvider: Send + Sync {
    fn manufacturer(&self) -> String;
    fn model(&self) -> String;
    fn os_name(&self) -> String;
    fn os_version(&self) -> String;
    /// 플랫폼 이름 (`X-Client-Platform` 헤더와 `platform` 태그)
    fn platform(&self) -> String;
}
