//! 원격 설정 문서 모델.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 원격 설정 트리 (문자열 키 맵)
pub type RemoteConfig = Map<String, Value>;

/// 캐시된 원격 설정과 마지막 조회 시각
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfigInfo {
    pub config: RemoteConfig,
    pub last_fetch: DateTime<Utc>,
}

impl RemoteConfigInfo {
    /// null 값을 정리해 생성
    pub fn new(config: RemoteConfig, last_fetch: DateTime<Utc>) -> Self {
        Self {
            config: normalize_config(config),
            last_fetch,
        }
    }
}

/// 설정 전달 출처
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// 로컬 캐시
    Cache,
    /// 원격 서버
    Remote,
}

/// 구독자 전달 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// 캐시 먼저, 이후 원격 값. 최소 한 번은 호출된다.
    All,
    /// 제한 시간 안에 원격 값, 아니면 캐시, 아니면 `None`. 정확히 한 번 호출된다.
    WaitForRemote(std::time::Duration),
}

/// 모든 깊이의 null을 제거한다. 배열 안의 null도 버린다.
pub fn normalize_config(config: RemoteConfig) -> RemoteConfig {
    config
        .into_iter()
        .filter_map(|(key, value)| normalize_value(value).map(|value| (key, value)))
        .collect()
}

fn normalize_value(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => Some(Value::Object(normalize_config(map))),
        Value::Array(items) => Some(Value::Array(
            items.into_iter().filter_map(normalize_value).collect(),
        )),
        scalar => Some(scalar),
    }
}

/// 점 구분 경로의 값을 꺼낸다.
///
/// 세그먼트가 없거나 중간 값이 맵이 아니면 `None`.
pub fn config_at_key_path(config: &RemoteConfig, key_path: &str) -> Option<RemoteConfig> {
    let mut current = config;
    for segment in key_path.split('.') {
        match current.get(segment) {
            Some(Value::Object(map)) => current = map,
            _ => return None,
        }
    }
    Some(current.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> RemoteConfig {
        match value {
            Value::Object(map) => map,
            _ => panic!("object expected"),
        }
    }

    #[test]
    fn nulls_are_pruned_recursively() {
        let config = as_map(json!({
            "a": null,
            "b": {"c": null, "d": 1},
            "e": [1, null, {"f": null}],
            "g": "text"
        }));

        let normalized = normalize_config(config);
        assert_eq!(
            Value::Object(normalized),
            json!({"b": {"d": 1}, "e": [1, {}], "g": "text"})
        );
    }

    #[test]
    fn key_path_lookup() {
        let config = as_map(json!({
            "diagnostics": {"rustSDK": {"enabled": true, "sampleRate": 0.5}},
            "flat": 3
        }));

        let nested = config_at_key_path(&config, "diagnostics.rustSDK").unwrap();
        assert_eq!(nested.get("enabled"), Some(&json!(true)));

        assert!(config_at_key_path(&config, "diagnostics.missing").is_none());
        assert!(config_at_key_path(&config, "flat").is_none());
        assert!(config_at_key_path(&config, "flat.deeper").is_none());
    }

    #[test]
    fn info_new_normalizes() {
        let info = RemoteConfigInfo::new(as_map(json!({"x": null, "y": 2})), Utc::now());
        assert_eq!(info.config.len(), 1);
        assert!(info.config.contains_key("y"));
    }
}
