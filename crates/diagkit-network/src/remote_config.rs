//! 원격 설정 클라이언트.
//!
//! 설정 문서를 HTTP로 조회(재시도/백오프)하고 캐시 저장소에 기록한 뒤,
//! 구독자에게 두 가지 전달 방식(`All`, `WaitForRemote`)으로 전달한다.
//!
//! - 진행 중인 원격 조회는 항상 하나이며 모든 구독자가 공유한다.
//! - 실패는 호출자에게 전파되지 않는다. 모든 전달 경로는 콜백 호출로 끝난다.

use chrono::{DateTime, Utc};
use diagkit_core::config::DiagnosticsConfig;
use diagkit_core::error::CoreError;
use diagkit_core::models::remote_config::{
    config_at_key_path, ConfigSource, DeliveryMode, RemoteConfig, RemoteConfigInfo,
};
use diagkit_core::ports::remote_config_storage::RemoteConfigStorage;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::http_client::{ClientHeaders, HttpClient};

/// 조회 요청에 포함하는 설정 키 허용 목록
pub const DEFAULT_CONFIG_KEYS: &[&str] = &[
    "sessionReplay.sr_ios_privacy_config",
    "sessionReplay.sr_ios_sampling_config",
    "analyticsSDK.browserSDK",
    "diagnostics",
];

/// 구독 콜백: (필터링된 설정, 출처, 마지막 조회 시각)
pub type ConfigCallback =
    Arc<dyn Fn(Option<RemoteConfig>, ConfigSource, Option<DateTime<Utc>>) + Send + Sync>;

/// 구독 해제용 불투명 토큰
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(Uuid);

/// 공유 조회 작업의 실패 사유
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteConfigError {
    #[error("네트워크 에러: {0}")]
    Network(String),

    #[error("예상치 못한 상태 코드: {0}")]
    Status(u16),

    #[error("응답 디코딩 실패: {0}")]
    Decode(String),

    #[error("조회 작업 취소됨")]
    Cancelled,
}

type FetchResult = Result<RemoteConfigInfo, RemoteConfigError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

// ============================================================
// 조회기 (재시도/백오프)
// ============================================================

/// 원격 설정 HTTP 조회기
pub struct RemoteConfigFetcher {
    http: HttpClient,
    url: Url,
    max_retries: u32,
    retry_base: Duration,
}

impl RemoteConfigFetcher {
    /// `<base>/<api_key>?config_keys=...` 요청 URL로 조회기 생성
    pub fn new(
        http: HttpClient,
        base_url: &str,
        api_key: &str,
        config_keys: &[&str],
    ) -> Result<Self, CoreError> {
        let mut url = Url::parse(base_url)
            .map_err(|e| CoreError::Config(format!("원격 설정 URL 파싱 실패: {base_url}: {e}")))?;

        url.path_segments_mut()
            .map_err(|_| CoreError::Config(format!("경로를 붙일 수 없는 URL: {base_url}")))?
            .pop_if_empty()
            .push(api_key);

        {
            let mut query = url.query_pairs_mut();
            for key in config_keys {
                query.append_pair("config_keys", key);
            }
        }

        Ok(Self {
            http,
            url,
            max_retries: 3,
            retry_base: Duration::from_secs(8),
        })
    }

    /// 재시도 횟수 설정
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// 백오프 기준 시간 설정
    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// 재시도가 포함된 조회
    ///
    /// 남은 재시도 횟수가 줄수록 대기 시간이 두 배로 늘어난다.
    pub async fn fetch(&self) -> FetchResult {
        let mut remaining = self.max_retries;
        loop {
            match self.fetch_once().await {
                Ok(config) => {
                    debug!("원격 설정 조회 성공: {}개 키", config.len());
                    return Ok(RemoteConfigInfo::new(config, Utc::now()));
                }
                Err(e) if remaining == 0 => {
                    warn!("원격 설정 조회 최종 실패: {e}");
                    return Err(e);
                }
                Err(e) => {
                    let delay = backoff_delay(self.retry_base, remaining);
                    warn!(
                        "원격 설정 조회 실패 (시도 {}/{}): {e}, {delay:?} 후 재시도",
                        self.max_retries - remaining + 1,
                        self.max_retries + 1
                    );
                    tokio::time::sleep(delay).await;
                    remaining -= 1;
                }
            }
        }
    }

    async fn fetch_once(&self) -> Result<RemoteConfig, RemoteConfigError> {
        let resp = self
            .http
            .json_request(reqwest::Method::GET, self.url.as_str())
            .send()
            .await
            .map_err(|e| RemoteConfigError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        if status != 200 {
            return Err(RemoteConfigError::Status(status));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| RemoteConfigError::Decode(e.to_string()))?;

        match body {
            Value::Object(mut root) => match root.remove("configs") {
                Some(Value::Object(configs)) => Ok(configs),
                _ => Err(RemoteConfigError::Decode("configs 객체 없음".to_string())),
            },
            _ => Err(RemoteConfigError::Decode("최상위가 객체가 아님".to_string())),
        }
    }
}

/// `base / 2^remaining`에 [0.4, 1.0) 지터 적용
fn backoff_delay(base: Duration, remaining: u32) -> Duration {
    let exponent = i32::try_from(remaining).unwrap_or(i32::MAX);
    let scaled = base.as_secs_f64() / 2f64.powi(exponent);
    Duration::from_secs_f64(scaled * rand::random_range(0.4..1.0))
}

// ============================================================
// 클라이언트
// ============================================================

struct CallbackInfo {
    key: Option<String>,
    mode: DeliveryMode,
    callback: ConfigCallback,
    last_callback_time: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct ClientState {
    callbacks: HashMap<SubscriptionToken, CallbackInfo>,
    remote_fetch: Option<SharedFetch>,
    fetch_abort: Option<AbortHandle>,
    /// 새 조회가 시작될 때마다 증가. 동시 갱신 요청 중복 제거용.
    generation: u64,
}

struct ClientInner {
    fetcher: Arc<RemoteConfigFetcher>,
    storage: Arc<dyn RemoteConfigStorage>,
    min_refresh_interval: Duration,
    state: Mutex<ClientState>,
}

/// 이미 한 번 호출된 `WaitForRemote` 구독자를 건너뛸지
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryGuard {
    Always,
    FirstOnly,
}

/// 원격 설정 클라이언트
///
/// 복제해도 같은 구독 레지스트리와 조회 작업을 공유한다.
#[derive(Clone)]
pub struct RemoteConfigClient {
    inner: Arc<ClientInner>,
}

impl RemoteConfigClient {
    /// 조회기와 캐시 저장소로 생성
    ///
    /// `min_refresh_interval` 안의 갱신 요청은 무시된다.
    pub fn new(
        fetcher: RemoteConfigFetcher,
        storage: Arc<dyn RemoteConfigStorage>,
        min_refresh_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                fetcher: Arc::new(fetcher),
                storage,
                min_refresh_interval,
                state: Mutex::new(ClientState::default()),
            }),
        }
    }

    /// 진단 설정으로 조회기까지 구성
    pub fn from_config(
        config: &DiagnosticsConfig,
        storage: Arc<dyn RemoteConfigStorage>,
    ) -> Result<Self, CoreError> {
        let settings = &config.remote_config;
        let http = HttpClient::new(ClientHeaders::from_config(config), settings.request_timeout())?;
        let fetcher = RemoteConfigFetcher::new(
            http,
            config.remote_config_base_url(),
            &config.api_key,
            DEFAULT_CONFIG_KEYS,
        )?
        .with_max_retries(settings.max_retries)
        .with_retry_base(settings.retry_base());

        Ok(Self::new(fetcher, storage, settings.min_refresh_interval()))
    }

    /// 구독 등록. 첫 구독이면 원격 조회를 시작한다.
    ///
    /// tokio 런타임 안에서 호출해야 한다.
    pub fn subscribe<F>(&self, key: Option<&str>, mode: DeliveryMode, callback: F) -> SubscriptionToken
    where
        F: Fn(Option<RemoteConfig>, ConfigSource, Option<DateTime<Utc>>) + Send + Sync + 'static,
    {
        let token = SubscriptionToken(Uuid::new_v4());
        self.inner.state.lock().callbacks.insert(
            token,
            CallbackInfo {
                key: key.map(str::to_string),
                mode,
                callback: Arc::new(callback),
                last_callback_time: None,
            },
        );

        let remote = self.inner.current_or_start_fetch();
        let weak = Arc::downgrade(&self.inner);
        let storage = Arc::clone(&self.inner.storage);

        tokio::spawn(async move {
            match mode {
                DeliveryMode::All => deliver_all(weak, token, storage, remote).await,
                DeliveryMode::WaitForRemote(timeout) => {
                    deliver_wait_for_remote(weak, token, storage, remote, timeout).await
                }
            }
        });

        token
    }

    /// 구독 해제. 이후 진행 중인 전달도 무시된다.
    pub fn unsubscribe(&self, token: SubscriptionToken) {
        if self.inner.state.lock().callbacks.remove(&token).is_none() {
            debug!("이미 해제된 구독: {token:?}");
        }
    }

    /// 등록된 구독자 수
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().callbacks.len()
    }

    /// 강제 갱신
    ///
    /// 현재 조회가 성공했고 최소 간격 안이면 아무것도 하지 않는다.
    /// 새 조회가 성공하면 `All` 구독자 전원과 아직 호출되지 않은 `WaitForRemote` 구독자에게 전달한다.
    pub async fn update_configs(&self) {
        let (observed_generation, current) = {
            let state = self.inner.state.lock();
            (state.generation, state.remote_fetch.clone())
        };

        if let Some(current) = current {
            if let Ok(info) = current.await {
                let elapsed = Utc::now().signed_duration_since(info.last_fetch);
                let fresh = elapsed
                    .to_std()
                    .map(|elapsed| elapsed < self.inner.min_refresh_interval)
                    .unwrap_or(true);
                if fresh {
                    debug!("최근 조회 결과가 유효하여 갱신 생략");
                    return;
                }
            }
        }

        let (fetch, started) = self.inner.start_fetch_if_generation(observed_generation);
        if !started {
            debug!("동시 갱신 요청: 진행 중인 조회에 합류");
            let _ = fetch.await;
            return;
        }

        match fetch.await {
            Ok(info) => {
                info!("원격 설정 갱신 완료");
                self.inner.notify_refreshed(&info);
            }
            Err(e) => warn!("원격 설정 갱신 실패: {e}"),
        }
    }
}

impl ClientInner {
    fn current_or_start_fetch(&self) -> SharedFetch {
        let mut state = self.state.lock();
        match &state.remote_fetch {
            Some(fetch) => fetch.clone(),
            None => self.start_fetch_locked(&mut state),
        }
    }

    fn start_fetch_if_generation(&self, observed: u64) -> (SharedFetch, bool) {
        let mut state = self.state.lock();
        match &state.remote_fetch {
            Some(fetch) if state.generation != observed => (fetch.clone(), false),
            _ => (self.start_fetch_locked(&mut state), true),
        }
    }

    fn start_fetch_locked(&self, state: &mut ClientState) -> SharedFetch {
        let fetcher = Arc::clone(&self.fetcher);
        let storage = Arc::clone(&self.storage);

        let handle = tokio::spawn(async move {
            let result: FetchResult = fetcher.fetch().await;
            if let Ok(info) = &result {
                storage.set_config(Some(info.clone())).await;
            }
            result
        });

        if let Some(previous) = state.fetch_abort.replace(handle.abort_handle()) {
            previous.abort();
        }

        let shared = async move {
            match handle.await {
                Ok(result) => result,
                Err(_) => Err(RemoteConfigError::Cancelled),
            }
        }
        .boxed()
        .shared();

        state.remote_fetch = Some(shared.clone());
        state.generation += 1;
        shared
    }

    fn notify_refreshed(&self, info: &RemoteConfigInfo) {
        let tokens: Vec<(SubscriptionToken, DeliveryGuard)> = self
            .state
            .lock()
            .callbacks
            .iter()
            .filter_map(|(token, cb)| match cb.mode {
                DeliveryMode::All => Some((*token, DeliveryGuard::Always)),
                DeliveryMode::WaitForRemote(_) if cb.last_callback_time.is_none() => {
                    Some((*token, DeliveryGuard::FirstOnly))
                }
                DeliveryMode::WaitForRemote(_) => None,
            })
            .collect();

        for (token, guard) in tokens {
            self.deliver(token, Some(info), ConfigSource::Remote, guard);
        }
    }

    /// 구독자 한 명에게 전달. 콜백은 잠금 밖에서 호출한다.
    fn deliver(
        &self,
        token: SubscriptionToken,
        info: Option<&RemoteConfigInfo>,
        source: ConfigSource,
        guard: DeliveryGuard,
    ) {
        let (callback, key) = {
            let mut state = self.state.lock();
            let Some(cb) = state.callbacks.get_mut(&token) else {
                return;
            };
            if guard == DeliveryGuard::FirstOnly && cb.last_callback_time.is_some() {
                return;
            }
            cb.last_callback_time = Some(Utc::now());
            (Arc::clone(&cb.callback), cb.key.clone())
        };

        let config = info.and_then(|info| match key.as_deref() {
            Some(path) => config_at_key_path(&info.config, path),
            None => Some(info.config.clone()),
        });
        callback(config, source, info.map(|info| info.last_fetch));
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(abort) = self.state.get_mut().fetch_abort.take() {
            abort.abort();
        }
    }
}

fn deliver_to(
    weak: &Weak<ClientInner>,
    token: SubscriptionToken,
    info: Option<&RemoteConfigInfo>,
    source: ConfigSource,
    guard: DeliveryGuard,
) {
    if let Some(inner) = weak.upgrade() {
        inner.deliver(token, info, source, guard);
    }
}

/// 캐시와 원격 조회를 경주시킨다. 둘 다 준비되면 원격이 이긴다.
async fn deliver_all(
    weak: Weak<ClientInner>,
    token: SubscriptionToken,
    storage: Arc<dyn RemoteConfigStorage>,
    remote: SharedFetch,
) {
    if let Some(Ok(info)) = remote.clone().now_or_never() {
        deliver_to(&weak, token, Some(&info), ConfigSource::Remote, DeliveryGuard::Always);
        return;
    }

    let cache = storage.fetch_config();
    tokio::pin!(cache);
    tokio::pin!(remote);

    let mut delivered = false;
    let mut cache_done = false;
    let mut remote_done = false;

    loop {
        tokio::select! {
            biased;
            result = &mut remote, if !remote_done => {
                remote_done = true;
                if let Ok(info) = result {
                    deliver_to(&weak, token, Some(&info), ConfigSource::Remote, DeliveryGuard::Always);
                    return;
                }
                if cache_done {
                    break;
                }
            }
            cached = &mut cache, if !cache_done => {
                cache_done = true;
                if let Some(info) = cached {
                    deliver_to(&weak, token, Some(&info), ConfigSource::Cache, DeliveryGuard::Always);
                    delivered = true;
                }
                if remote_done {
                    break;
                }
            }
        }
    }

    if !delivered {
        deliver_to(&weak, token, None, ConfigSource::Remote, DeliveryGuard::Always);
    }
}

/// 제한 시간 안의 원격 값 → 캐시 → `None` 순서로 정확히 한 번 전달
async fn deliver_wait_for_remote(
    weak: Weak<ClientInner>,
    token: SubscriptionToken,
    storage: Arc<dyn RemoteConfigStorage>,
    remote: SharedFetch,
    timeout: Duration,
) {
    if let Ok(Ok(info)) = tokio::time::timeout(timeout, remote).await {
        deliver_to(&weak, token, Some(&info), ConfigSource::Remote, DeliveryGuard::FirstOnly);
        return;
    }

    match storage.fetch_config().await {
        Some(info) => deliver_to(&weak, token, Some(&info), ConfigSource::Cache, DeliveryGuard::FirstOnly),
        None => deliver_to(&weak, token, None, ConfigSource::Remote, DeliveryGuard::FirstOnly),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockito::Matcher;
    use serde_json::json;
    use std::io::Write;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct TestStorage {
        info: tokio::sync::Mutex<Option<RemoteConfigInfo>>,
    }

    impl TestStorage {
        fn with_cached(config: Value) -> Arc<Self> {
            let Value::Object(map) = config else {
                panic!("object expected");
            };
            Arc::new(Self {
                info: tokio::sync::Mutex::new(Some(RemoteConfigInfo::new(map, Utc::now()))),
            })
        }
    }

    #[async_trait]
    impl RemoteConfigStorage for TestStorage {
        async fn fetch_config(&self) -> Option<RemoteConfigInfo> {
            self.info.lock().await.clone()
        }

        async fn set_config(&self, info: Option<RemoteConfigInfo>) {
            *self.info.lock().await = info;
        }
    }

    type Delivery = (Option<RemoteConfig>, ConfigSource);

    fn fetcher_for(base_url: &str) -> RemoteConfigFetcher {
        let http = HttpClient::new(
            ClientHeaders::new("diagkit-rust", "linux", None),
            Duration::from_secs(5),
        )
        .unwrap();
        RemoteConfigFetcher::new(http, base_url, "test-key", DEFAULT_CONFIG_KEYS)
            .unwrap()
            .with_max_retries(0)
            .with_retry_base(Duration::from_millis(10))
    }

    fn recorder() -> (
        impl Fn(Option<RemoteConfig>, ConfigSource, Option<DateTime<Utc>>) + Send + Sync + 'static,
        mpsc::UnboundedReceiver<Delivery>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback = move |config: Option<RemoteConfig>, source: ConfigSource, _: Option<DateTime<Utc>>| {
            let _ = tx.send((config, source));
        };
        (callback, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Delivery {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("콜백 대기 시간 초과")
            .expect("채널 닫힘")
    }

    /// 연결은 받지만 응답하지 않는 주소 (느린 원격 서버)
    fn silent_listener() -> (std::net::TcpListener, String) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/config", listener.local_addr().unwrap());
        (listener, url)
    }

    /// 연결이 거부되는 주소
    fn refused_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/config")
    }

    #[test]
    fn request_url_encodes_api_key_and_keys() {
        let http = HttpClient::new(
            ClientHeaders::new("diagkit-rust", "linux", None),
            Duration::from_secs(1),
        )
        .unwrap();
        let fetcher = RemoteConfigFetcher::new(
            http,
            "https://example.com/config",
            "a b/c",
            &["diagnostics", "analyticsSDK.browserSDK"],
        )
        .unwrap();

        assert_eq!(
            fetcher.url().as_str(),
            "https://example.com/config/a%20b%2Fc?config_keys=diagnostics&config_keys=analyticsSDK.browserSDK"
        );
    }

    #[test]
    fn backoff_grows_as_retries_run_out() {
        let base = Duration::from_secs(8);
        for _ in 0..20 {
            let first = backoff_delay(base, 3);
            assert!(first >= Duration::from_millis(400) && first < Duration::from_secs(1));
            let last = backoff_delay(base, 1);
            assert!(last >= Duration::from_millis(1600) && last < Duration::from_secs(4));
        }
    }

    #[tokio::test]
    async fn fetch_prunes_nulls() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/config/test-key")
            .match_query(Matcher::UrlEncoded(
                "config_keys".to_string(),
                "diagnostics".to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"configs": {"a": null, "b": {"c": 1, "d": null}}}"#)
            .create_async()
            .await;

        let fetcher = fetcher_for(&format!("{}/config", server.url()));
        let info = fetcher.fetch().await.unwrap();

        assert_eq!(Value::Object(info.config), json!({"b": {"c": 1}}));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_retries_then_fails() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/config/test-key")
            .match_query(Matcher::Any)
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let fetcher = fetcher_for(&format!("{}/config", server.url())).with_max_retries(2);
        let result = fetcher.fetch().await;

        assert_eq!(result, Err(RemoteConfigError::Status(500)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_configs_object_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/config/test-key")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"other": {}}"#)
            .create_async()
            .await;

        let fetcher = fetcher_for(&format!("{}/config", server.url()));
        assert!(matches!(
            fetcher.fetch().await,
            Err(RemoteConfigError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn all_mode_ends_with_remote_value() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/config/test-key")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"configs": {"diagnostics": {"rustSDK": {"enabled": true}}}}"#)
            .create_async()
            .await;

        let storage = TestStorage::with_cached(json!({"diagnostics": {"rustSDK": {"enabled": false}}}));
        let client = RemoteConfigClient::new(
            fetcher_for(&format!("{}/config", server.url())),
            storage.clone(),
            Duration::from_secs(300),
        );

        let (callback, mut rx) = recorder();
        client.subscribe(Some("diagnostics.rustSDK"), DeliveryMode::All, callback);

        let mut deliveries = vec![next(&mut rx).await];
        if deliveries[0].1 == ConfigSource::Cache {
            assert_eq!(deliveries[0].0.as_ref().unwrap()["enabled"], json!(false));
            deliveries.push(next(&mut rx).await);
        }

        let (config, source) = deliveries.last().unwrap();
        assert_eq!(*source, ConfigSource::Remote);
        assert_eq!(config.as_ref().unwrap()["enabled"], json!(true));

        // 성공한 조회는 캐시에 기록된다
        let cached = storage.fetch_config().await.unwrap();
        assert_eq!(cached.config["diagnostics"]["rustSDK"]["enabled"], json!(true));
    }

    #[tokio::test]
    async fn all_mode_delivers_none_when_everything_fails() {
        let client = RemoteConfigClient::new(
            fetcher_for(&refused_url()),
            Arc::new(TestStorage::default()),
            Duration::from_secs(300),
        );

        let (callback, mut rx) = recorder();
        client.subscribe(None, DeliveryMode::All, callback);

        let (config, source) = next(&mut rx).await;
        assert!(config.is_none());
        assert_eq!(source, ConfigSource::Remote);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn wait_for_remote_falls_back_to_cache_once() {
        let (_listener, url) = silent_listener();
        let storage = TestStorage::with_cached(json!({"diagnostics": {"rustSDK": {"sampleRate": 0.5}}}));
        let client = RemoteConfigClient::new(fetcher_for(&url), storage, Duration::from_secs(300));

        let (callback, mut rx) = recorder();
        client.subscribe(
            Some("diagnostics.rustSDK"),
            DeliveryMode::WaitForRemote(Duration::from_millis(200)),
            callback,
        );

        let (config, source) = next(&mut rx).await;
        assert_eq!(source, ConfigSource::Cache);
        assert_eq!(config.unwrap()["sampleRate"], json!(0.5));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn wait_for_remote_delivers_remote_in_time() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/config/test-key")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"configs": {"diagnostics": {"rustSDK": {"enabled": true}}}}"#)
            .create_async()
            .await;

        let storage = TestStorage::with_cached(json!({"diagnostics": {"rustSDK": {"enabled": false}}}));
        let client = RemoteConfigClient::new(
            fetcher_for(&format!("{}/config", server.url())),
            storage,
            Duration::from_secs(300),
        );

        let (callback, mut rx) = recorder();
        client.subscribe(
            Some("diagnostics.rustSDK"),
            DeliveryMode::WaitForRemote(Duration::from_secs(3)),
            callback,
        );

        let (config, source) = next(&mut rx).await;
        assert_eq!(source, ConfigSource::Remote);
        assert_eq!(config.unwrap()["enabled"], json!(true));
    }

    #[tokio::test]
    async fn missing_key_path_delivers_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/config/test-key")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"configs": {"analyticsSDK": {"browserSDK": {}}}}"#)
            .create_async()
            .await;

        let client = RemoteConfigClient::new(
            fetcher_for(&format!("{}/config", server.url())),
            Arc::new(TestStorage::default()),
            Duration::from_secs(300),
        );

        let (callback, mut rx) = recorder();
        client.subscribe(
            Some("diagnostics.rustSDK"),
            DeliveryMode::WaitForRemote(Duration::from_secs(3)),
            callback,
        );

        let (config, source) = next(&mut rx).await;
        assert_eq!(source, ConfigSource::Remote);
        assert!(config.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_subscribers_share_one_fetch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/config/test-key")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_chunked_body(|w| {
                // 응답을 늦춰 나머지 구독이 조회 도중에 들어오게 한다
                std::thread::sleep(Duration::from_millis(400));
                w.write_all(br#"{"configs": {"diagnostics": {"rustSDK": {"sampleRate": 0.75}}}}"#)
            })
            .expect(1)
            .create_async()
            .await;

        let client = RemoteConfigClient::new(
            fetcher_for(&format!("{}/config", server.url())),
            Arc::new(TestStorage::default()),
            Duration::from_secs(300),
        );

        let (first_callback, first_rx) = recorder();
        client.subscribe(Some("diagnostics.rustSDK"), DeliveryMode::All, first_callback);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut receivers = vec![first_rx];
        let mut joins = Vec::new();
        for _ in 0..3 {
            let client = client.clone();
            let (callback, rx) = recorder();
            receivers.push(rx);
            joins.push(tokio::spawn(async move {
                client.subscribe(Some("diagnostics.rustSDK"), DeliveryMode::All, callback);
            }));
        }
        for join in joins {
            join.await.unwrap();
        }
        assert_eq!(client.subscriber_count(), 4);

        for rx in &mut receivers {
            let (config, source) = next(rx).await;
            assert_eq!(source, ConfigSource::Remote);
            assert_eq!(config.unwrap()["sampleRate"], json!(0.75));
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn update_configs_respects_min_interval() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/config/test-key")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"configs": {"x": 1}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = RemoteConfigClient::new(
            fetcher_for(&format!("{}/config", server.url())),
            Arc::new(TestStorage::default()),
            Duration::from_secs(300),
        );

        let (callback, mut rx) = recorder();
        client.subscribe(None, DeliveryMode::WaitForRemote(Duration::from_secs(3)), callback);
        next(&mut rx).await;

        client.update_configs().await;
        client.update_configs().await;

        mock.assert_async().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn update_configs_refreshes_all_subscribers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/config/test-key")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"configs": {"x": 1}}"#)
            .expect(2)
            .create_async()
            .await;

        let client = RemoteConfigClient::new(
            fetcher_for(&format!("{}/config", server.url())),
            Arc::new(TestStorage::default()),
            Duration::ZERO,
        );

        let (all_callback, mut all_rx) = recorder();
        client.subscribe(None, DeliveryMode::All, all_callback);
        let (wait_callback, mut wait_rx) = recorder();
        client.subscribe(
            None,
            DeliveryMode::WaitForRemote(Duration::from_secs(3)),
            wait_callback,
        );

        // 최초 전달: All은 원격 값으로 끝난다
        loop {
            let (_, source) = next(&mut all_rx).await;
            if source == ConfigSource::Remote {
                break;
            }
        }
        next(&mut wait_rx).await;

        client.update_configs().await;

        let (config, source) = next(&mut all_rx).await;
        assert_eq!(source, ConfigSource::Remote);
        assert_eq!(config.unwrap()["x"], json!(1));
        // 이미 한 번 호출된 WaitForRemote 구독자는 다시 호출되지 않는다
        assert!(wait_rx.try_recv().is_err());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unsubscribed_callbacks_are_not_invoked() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/config/test-key")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"configs": {"x": 1}}"#)
            .create_async()
            .await;

        let client = RemoteConfigClient::new(
            fetcher_for(&format!("{}/config", server.url())),
            Arc::new(TestStorage::default()),
            Duration::ZERO,
        );

        let (callback, mut rx) = recorder();
        let token = client.subscribe(None, DeliveryMode::WaitForRemote(Duration::from_secs(3)), callback);
        next(&mut rx).await;

        client.unsubscribe(token);
        assert_eq!(client.subscriber_count(), 0);

        client.update_configs().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
