//! sysinfo 기반 디바이스 정보 제공자.

use diagkit_core::ports::device_info::DeviceInfoProvider;
use sysinfo::System;

/// 생성 시점에 한 번 수집한 디바이스/OS 정보
#[derive(Debug, Clone)]
pub struct SysInfoDeviceInfo {
    manufacturer: String,
    model: String,
    os_name: String,
    os_version: String,
    platform: String,
}

impl SysInfoDeviceInfo {
    pub fn new() -> Self {
        let platform = std::env::consts::OS.to_string();
        let manufacturer = match std::env::consts::OS {
            "macos" | "ios" => "Apple".to_string(),
            "windows" => "Microsoft".to_string(),
            _ => System::distribution_id(),
        };

        Self {
            manufacturer,
            model: std::env::consts::ARCH.to_string(),
            os_name: System::name().unwrap_or_else(|| platform.clone()),
            os_version: System::os_version().unwrap_or_default(),
            platform,
        }
    }
}

impl Default for SysInfoDeviceInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceInfoProvider for SysInfoDeviceInfo {
    fn manufacturer(&self) -> String {
        self.manufacturer.clone()
    }

    fn model(&self) -> String {
        self.model.clone()
    }

    fn os_name(&self) -> String {
        self.os_name.clone()
    }

    fn os_version(&self) -> String {
        self.os_version.clone()
    }

    fn platform(&self) -> String {
        self.platform.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_matches_build_target() {
        let info = SysInfoDeviceInfo::new();
        assert_eq!(info.platform(), std::env::consts::OS);
        assert_eq!(info.model(), std::env::consts::ARCH);
        assert!(!info.os_name().is_empty());
    }
}
