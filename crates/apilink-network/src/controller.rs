//! 세션 컨트롤러.
//!
//! REST 세션, 온라인 추적기, WebSocket 세션, 레이트 리미터, 인증 헤더를
//! 하나의 공유 [`SessionState`]와 [`EventHub`] 위에 조립하는 파사드.
//! 애플리케이션은 이 타입만 사용한다.

use apilink_core::config::{whole_secs, RateLimiterConfig, SessionConfig};
use apilink_core::error::CoreError;
use apilink_core::models::auth::{
    AuthHeaderSet, AuthHeaderTarget, AuthTypeTarget, AuthenticationHeader,
};
use apilink_core::models::event::SessionEvent;
use apilink_core::models::outcome::RequestOutcome;
use apilink_core::models::request::RestRequest;
use apilink_core::models::session::{SessionSnapshot, SessionState};
use apilink_core::ports::socket::SocketTransport;
use apilink_core::ports::transport::{ClientSettings, HttpTransportFactory};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::event_hub::EventHub;
use crate::http_transport::ReqwestTransportFactory;
use crate::online::{OnlinePolicy, OnlineStateTracker, ProbeTarget};
use crate::rate_limiter::TokenBucketLimiter;
use crate::rest_session::RestSession;
use crate::ws_session::{RefreshCallback, WebSocketSession};
use crate::ws_transport::TungsteniteTransport;

/// API 키 헤더 이름
const AUTHORIZATION: &str = "Authorization";

/// 이벤트 채널 기본 용량
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// [`SessionController`] 빌더
#[derive(Default)]
pub struct SessionControllerBuilder {
    config: Option<SessionConfig>,
    web_address: Option<String>,
    version: Option<String>,
    api_key: Option<String>,
    http_factory: Option<Arc<dyn HttpTransportFactory>>,
    socket_transport: Option<Arc<dyn SocketTransport>>,
    event_capacity: Option<usize>,
}

impl SessionControllerBuilder {
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_web_address(mut self, web_address: impl Into<String>) -> Self {
        self.web_address = Some(web_address.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// `Authorization: Bearer <key>` 헤더 등록 (REST/WebSocket 공통)
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_web_address_and_api_key(
        self,
        web_address: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        self.with_web_address(web_address).with_api_key(api_key)
    }

    /// HTTP 전송 팩토리 교체 (기본: reqwest)
    pub fn with_http_factory(mut self, factory: Arc<dyn HttpTransportFactory>) -> Self {
        self.http_factory = Some(factory);
        self
    }

    /// WebSocket 전송 교체 (기본: tokio-tungstenite)
    pub fn with_socket_transport(mut self, transport: Arc<dyn SocketTransport>) -> Self {
        self.socket_transport = Some(transport);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }

    pub fn build(self) -> Result<SessionController, CoreError> {
        let mut config = self.config.unwrap_or_else(SessionConfig::default_config);
        if let Some(web_address) = self.web_address {
            config.server.base_url = web_address;
        }
        if let Some(version) = self.version {
            config.server.api_version = version;
        }
        config.validate()?;

        let events = EventHub::new(self.event_capacity.unwrap_or(DEFAULT_EVENT_CAPACITY));
        events.set_rethrow(config.server.rethrow_on_error);
        let state = Arc::new(SessionState::new());

        let factory = self
            .http_factory
            .unwrap_or_else(|| Arc::new(ReqwestTransportFactory));
        let rest = Arc::new(RestSession::new(
            factory,
            ClientSettings::from_config(&config),
            limiter_for(&config.rate_limiter),
            Arc::clone(&state),
            events.clone(),
        )?);
        let online = Arc::new(OnlineStateTracker::new(
            Arc::clone(&rest),
            policy_for(&config),
        ));

        let socket = self
            .socket_transport
            .unwrap_or_else(|| Arc::new(TungsteniteTransport::new()));
        let websocket =
            WebSocketSession::new(socket, Arc::clone(&state), events.clone(), &config.websocket);

        let mut auth_headers = AuthHeaderSet::new();
        if let Some(api_key) = self.api_key {
            auth_headers.insert(
                AUTHORIZATION,
                AuthenticationHeader::new(format!("Bearer {api_key}")),
            );
        }
        websocket.set_auth_headers(auth_headers.clone());

        info!(
            "세션 컨트롤러 생성: {}",
            ClientSettings::from_config(&config).base_uri
        );
        Ok(SessionController {
            config: RwLock::new(config),
            state,
            events,
            rest,
            online,
            websocket,
            auth_headers: Arc::new(RwLock::new(auth_headers)),
            monitor: Mutex::new(None),
        })
    }
}

fn limiter_for(config: &RateLimiterConfig) -> Option<Arc<TokenBucketLimiter>> {
    config
        .enabled
        .then(|| Arc::new(TokenBucketLimiter::new(config.clone())))
}

fn policy_for(config: &SessionConfig) -> OnlinePolicy {
    OnlinePolicy {
        retries_when_offline: config.server.retries_when_offline,
        offline_retry_timeout: config.offline_retry_timeout(),
    }
}

/// 세션 컨트롤러
pub struct SessionController {
    config: RwLock<SessionConfig>,
    state: Arc<SessionState>,
    events: EventHub,
    rest: Arc<RestSession>,
    online: Arc<OnlineStateTracker>,
    websocket: WebSocketSession,
    /// 온라인 모니터와 공유 (주기마다 현재 값을 읽음)
    auth_headers: Arc<RwLock<AuthHeaderSet>>,
    monitor: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("base_uri", &self.rest.settings().base_uri)
            .field("state", &self.state.snapshot())
            .finish()
    }
}

impl SessionController {
    pub fn builder() -> SessionControllerBuilder {
        SessionControllerBuilder::default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> SessionConfig {
        self.config.read().clone()
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    pub fn rest(&self) -> &Arc<RestSession> {
        &self.rest
    }

    pub fn websocket(&self) -> &WebSocketSession {
        &self.websocket
    }

    pub fn is_online(&self) -> bool {
        self.state.is_online()
    }

    pub fn is_listening(&self) -> bool {
        self.state.is_listening()
    }

    // ----------------------------------------------------------------
    // 인증 헤더
    // ----------------------------------------------------------------

    pub fn auth_headers(&self) -> AuthHeaderSet {
        self.auth_headers.read().clone()
    }

    /// 인증 헤더 추가 또는 교체 (WebSocket은 다음 연결부터 적용)
    pub fn add_or_update_auth_header(
        &self,
        name: impl Into<String>,
        token: impl Into<String>,
        target: AuthHeaderTarget,
        order: i32,
        kind: AuthTypeTarget,
    ) {
        let headers = {
            let mut headers = self.auth_headers.write();
            headers.add_or_update(name, token, target, order, kind);
            headers.clone()
        };
        self.websocket.set_auth_headers(headers);
    }

    pub fn remove_auth_header(&self, name: &str) -> bool {
        let (removed, headers) = {
            let mut headers = self.auth_headers.write();
            let removed = headers.remove(name).is_some();
            (removed, headers.clone())
        };
        self.websocket.set_auth_headers(headers);
        removed
    }

    // ----------------------------------------------------------------
    // REST
    // ----------------------------------------------------------------

    /// REST 요청 실행
    ///
    /// 컨트롤러에 등록된 인증 헤더를 기본으로 쓰고, 요청에 같은 이름의
    /// 헤더가 있으면 요청 쪽이 우선한다.
    pub async fn execute(&self, request: RestRequest) -> Result<RequestOutcome, CoreError> {
        let request = self.with_default_auth(request);
        self.rest.execute(request).await
    }

    /// 성공 본문을 `T`로 디코딩 (실패 시 `Ok(None)`)
    pub async fn execute_as<T: DeserializeOwned>(
        &self,
        request: RestRequest,
    ) -> Result<Option<T>, CoreError> {
        let request = self.with_default_auth(request);
        self.rest.execute_as(request).await
    }

    fn with_default_auth(&self, mut request: RestRequest) -> RestRequest {
        let mut merged = self.auth_headers.read().clone();
        for (name, header) in request.auth_headers.ordered() {
            merged.insert(name, header.clone());
        }
        request.auth_headers = merged;
        request
    }

    pub fn cancel_current_requests(&self) {
        self.rest.cancel_current_requests();
    }

    // ----------------------------------------------------------------
    // 온라인 확인
    // ----------------------------------------------------------------

    /// 기본 URI로 생존 확인
    pub async fn check_online(&self, timeout: Option<Duration>) -> Result<bool, CoreError> {
        self.check_online_at("", "", timeout).await
    }

    pub async fn check_online_at(
        &self,
        command_base: &str,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<bool, CoreError> {
        let auth = self.auth_headers();
        self.online.probe(command_base, &auth, command, timeout).await
    }

    /// 생존 확인 후 온라인이면서 인증 실패 상태가 아닌지 반환
    pub async fn check_if_api_is_valid(
        &self,
        command_base: &str,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<bool, CoreError> {
        let online = self.check_online_at(command_base, command, timeout).await?;
        Ok(online && !self.state.authentication_failed())
    }

    /// 주기적 생존 확인 시작 (기존 모니터는 중단)
    ///
    /// 인증 헤더는 매 주기마다 컨트롤러의 현재 값을 사용한다.
    pub fn start_online_monitor(&self, interval: Duration) {
        self.stop_online_monitor();
        let cancel = CancellationToken::new();
        let target = ProbeTarget {
            auth_headers: Arc::clone(&self.auth_headers),
            ..ProbeTarget::default()
        };
        let handle = Arc::clone(&self.online).spawn_periodic(interval, target, cancel.clone());
        *self.monitor.lock() = Some((cancel, handle));
        debug!("주기적 온라인 확인 시작: {interval:?}");
    }

    pub fn stop_online_monitor(&self) {
        if let Some((cancel, _handle)) = self.monitor.lock().take() {
            cancel.cancel();
        }
    }

    /// 히스테리시스 정책 변경 (타임아웃은 초 단위로 올림, 0은 거부)
    pub fn set_online_policy(
        &self,
        retries_when_offline: u32,
        offline_retry_timeout: Duration,
    ) -> Result<(), CoreError> {
        let retry_secs = whole_secs("server.offline_retry_timeout_secs", offline_retry_timeout)?;
        let config = self.update_config(|config| {
            config.server.retries_when_offline = retries_when_offline;
            config.server.offline_retry_timeout_secs = retry_secs;
        })?;
        self.online.set_policy(policy_for(&config));
        Ok(())
    }

    // ----------------------------------------------------------------
    // WebSocket
    // ----------------------------------------------------------------

    /// 설정된 WebSocket 대상으로 listen 시작
    pub async fn start_listening(
        &self,
        stop_active: bool,
        refresh: Option<RefreshCallback>,
        commands_on_connect: Vec<String>,
    ) -> Result<(), CoreError> {
        let target = self.config.read().websocket.target_uri.clone();
        self.start_listening_at(&target, stop_active, refresh, commands_on_connect)
            .await
    }

    pub async fn start_listening_at(
        &self,
        target: &str,
        stop_active: bool,
        refresh: Option<RefreshCallback>,
        commands_on_connect: Vec<String>,
    ) -> Result<(), CoreError> {
        self.websocket
            .start_listening(target, stop_active, refresh, commands_on_connect)
            .await
    }

    /// 진행 중인 REST 요청 취소 후 listen 종료
    pub async fn stop_listening(&self) {
        self.rest.cancel_current_requests();
        self.websocket.stop_listening().await;
    }

    pub async fn connect_websocket(
        &self,
        target: &str,
        commands_on_connect: Vec<String>,
    ) -> Result<(), CoreError> {
        self.websocket.connect(target, commands_on_connect).await
    }

    pub async fn disconnect_websocket(&self) {
        self.websocket.disconnect().await;
    }

    pub async fn send_ping(&self, data: Option<Value>) -> Result<(), CoreError> {
        self.websocket.send_ping(data).await
    }

    pub async fn send_command(&self, command: impl Into<String>) -> Result<(), CoreError> {
        self.websocket.send_command(command).await
    }

    pub fn set_websocket_target(&self, target_uri: impl Into<String>) -> Result<(), CoreError> {
        let target_uri = target_uri.into();
        self.update_config(|config| config.websocket.target_uri = target_uri)?;
        Ok(())
    }

    pub async fn set_ping_interval(&self, interval: Duration) -> Result<(), CoreError> {
        let secs = whole_secs("websocket.ping.interval_secs", interval)?;
        self.update_config(|config| config.websocket.ping.interval_secs = secs)?;
        self.websocket.set_ping_interval(interval).await
    }

    pub async fn set_refresh_interval(&self, interval: Duration) -> Result<(), CoreError> {
        let secs = whole_secs("websocket.refresh.interval_secs", interval)?;
        self.update_config(|config| config.websocket.refresh.interval_secs = secs)?;
        self.websocket.set_refresh_interval(interval).await
    }

    /// 세션 ID 변경 (바뀐 경우에만 이벤트 발행)
    pub fn set_session_id(&self, session_id: &str) {
        if self.state.set_session_id(session_id) {
            self.events.publish(SessionEvent::SessionChanged {
                session_id: session_id.to_string(),
            });
        }
    }

    // ----------------------------------------------------------------
    // 전송 설정 (변경 시 전송 클라이언트 재생성)
    // ----------------------------------------------------------------

    pub fn set_base_url(&self, base_url: impl Into<String>) -> Result<(), CoreError> {
        let base_url = base_url.into();
        self.reconfigure_with(|config| config.server.base_url = base_url)
    }

    pub fn set_api_version(&self, api_version: impl Into<String>) -> Result<(), CoreError> {
        let api_version = api_version.into();
        self.reconfigure_with(|config| config.server.api_version = api_version)
    }

    /// 기본 요청 타임아웃 변경 (초 단위로 올림, 0은 거부)
    pub fn set_default_timeout(&self, timeout: Duration) -> Result<(), CoreError> {
        let secs = whole_secs("server.default_timeout_secs", timeout)?;
        self.reconfigure_with(|config| config.server.default_timeout_secs = secs)
    }

    /// 프록시 설정 (`user`가 비어 있지 않으면 basic 인증)
    pub fn set_proxy(
        &self,
        secure: bool,
        address: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: Option<String>,
    ) -> Result<(), CoreError> {
        let address = address.into();
        let user = user.into();
        self.reconfigure_with(|config| {
            config.proxy.enabled = true;
            config.proxy.secure = secure;
            config.proxy.address = address;
            config.proxy.port = port;
            config.proxy.user = user;
            config.proxy.password = password;
        })
    }

    pub fn clear_proxy(&self) -> Result<(), CoreError> {
        self.reconfigure_with(|config| config.proxy.enabled = false)
    }

    /// 레이트 리미터 교체 (전송 클라이언트 재생성)
    pub fn set_rate_limiter_config(&self, limiter: RateLimiterConfig) -> Result<(), CoreError> {
        let config = self.update_config(|config| config.rate_limiter = limiter)?;
        self.rest.set_limiter(limiter_for(&config.rate_limiter))?;
        Ok(())
    }

    pub fn disable_rate_limiter(&self) -> Result<(), CoreError> {
        let config = self.update_config(|config| config.rate_limiter.enabled = false)?;
        self.rest.set_limiter(limiter_for(&config.rate_limiter))?;
        Ok(())
    }

    pub fn set_rethrow(&self, rethrow: bool) {
        self.config.write().server.rethrow_on_error = rethrow;
        self.events.set_rethrow(rethrow);
    }

    fn reconfigure_with<F>(&self, update: F) -> Result<(), CoreError>
    where
        F: FnOnce(&mut SessionConfig),
    {
        let config = self.update_config(update)?;
        self.rest.reconfigure(ClientSettings::from_config(&config))?;
        Ok(())
    }

    /// 검증 통과 시에만 설정 반영
    fn update_config<F>(&self, update: F) -> Result<SessionConfig, CoreError>
    where
        F: FnOnce(&mut SessionConfig),
    {
        let mut next = self.config.read().clone();
        update(&mut next);
        next.validate()?;
        *self.config.write() = next.clone();
        Ok(next)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop_online_monitor();
    }
}
