//! WebSocket 세션.
//!
//! 논리적 WebSocket 연결 1개를 소유한다. 연결/해제, 핑 루프,
//! 수신 메시지 기반 리프레시 주기, 수신 이벤트 디스패치를 담당한다.
//!
//! 수명주기 전이(start/stop/connect/disconnect)는 `tokio::sync::Mutex`로
//! 직렬화하고, 카운터와 타임스탬프는 [`SessionState`]에 원자적으로 기록한다.

use apilink_core::config::{whole_secs, PingConfig, RefreshConfig, WebSocketConfig};
use apilink_core::error::CoreError;
use apilink_core::models::auth::{AuthHeaderSet, AuthHeaderTarget};
use apilink_core::models::event::{DisconnectInfo, SessionEvent};
use apilink_core::models::ping::PingPayload;
use apilink_core::models::session::SessionState;
use apilink_core::ports::socket::{
    ReconnectKind, SocketEvent, SocketHandle, SocketOptions, SocketTransport,
};
use chrono::Utc;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::event_hub::EventHub;
use crate::strip_query;

/// 리프레시 콜백 (N번째 리프레시 윈도우마다 별도 태스크로 실행)
pub type RefreshCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// 소켓 dispose 전 대기 (진행 중인 송신 배출)
const DISPOSE_GRACE: Duration = Duration::from_millis(10);

/// 핑 루프 최대 점검 간격
const PING_CHECK: Duration = Duration::from_secs(1);

/// 세션 런타임 설정
#[derive(Debug, Clone)]
struct WsSettings {
    ping: PingConfig,
    refresh: RefreshConfig,
    reconnect_timeout: Duration,
}

impl From<&WebSocketConfig> for WsSettings {
    fn from(config: &WebSocketConfig) -> Self {
        Self {
            ping: config.ping.clone(),
            refresh: config.refresh.clone(),
            reconnect_timeout: Duration::from_secs(config.reconnect_timeout_secs),
        }
    }
}

/// 마지막 listen 대상 (간격 변경 시 재연결용)
#[derive(Clone)]
struct ListenTarget {
    uri: String,
    refresh: Option<RefreshCallback>,
    commands: Vec<String>,
}

/// 현재 연결
struct ActiveSocket {
    uri: String,
    handle: Arc<dyn SocketHandle>,
    cancel: CancellationToken,
    pump: JoinHandle<()>,
    pinger: Option<JoinHandle<()>>,
}

/// 백그라운드 태스크와 공유하는 상태
struct Shared {
    state: Arc<SessionState>,
    events: EventHub,
    settings: RwLock<WsSettings>,
}

impl Shared {
    fn build_ping_command(&self, data: Option<&Value>) -> Result<String, CoreError> {
        let command = self.settings.read().ping.command.clone();
        match data {
            None if !command.is_empty() => Ok(command),
            None => Ok(serde_json::to_string(&PingPayload::new(
                self.state.ping_counter(),
            ))?),
            Some(data) => Ok(serde_json::to_string(data)?),
        }
    }

    async fn send_ping(
        &self,
        handle: &dyn SocketHandle,
        data: Option<&Value>,
    ) -> Result<(), CoreError> {
        let command = self.build_ping_command(data)?;
        handle.send(command.clone()).await?;
        debug!("핑 전송: {command}");
        self.events.publish(SessionEvent::PingSent {
            timestamp: Utc::now(),
            command,
        });
        Ok(())
    }

    fn mark_listening(&self, listening: bool) {
        if self.state.set_listening(listening) {
            self.events.publish(SessionEvent::ListeningChanged {
                session_id: self.state.session_id(),
                is_listening: listening,
            });
        }
    }

    /// 텍스트 프레임 처리: 리프레시 주기 갱신 후 메시지 이벤트 발행
    fn on_message(&self, text: String, refresh: Option<&RefreshCallback>) {
        if text.is_empty() {
            return;
        }

        let RefreshConfig {
            interval_secs,
            count_threshold,
        } = self.settings.read().refresh.clone();
        let now = Instant::now();
        if now.duration_since(self.state.last_refresh_at()) >= Duration::from_secs(interval_secs) {
            self.state.stamp_refresh(now);
            if self.state.refresh_counter() > count_threshold {
                self.state.reset_refresh_counter();
                if let Some(refresh) = refresh {
                    debug!("리프레시 콜백 실행");
                    tokio::spawn(refresh());
                }
            } else {
                self.state.increment_refresh_counter();
            }
        }

        self.events.publish(SessionEvent::MessageReceived {
            callback_id: self.state.ping_counter(),
            message: text,
            session_id: self.state.session_id(),
        });
    }
}

/// WebSocket 세션
pub struct WebSocketSession {
    transport: Arc<dyn SocketTransport>,
    shared: Arc<Shared>,
    auth_headers: RwLock<AuthHeaderSet>,
    target: RwLock<Option<ListenTarget>>,
    handle: RwLock<Option<(String, Arc<dyn SocketHandle>)>>,
    lifecycle: Mutex<Option<ActiveSocket>>,
}

impl WebSocketSession {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        state: Arc<SessionState>,
        events: EventHub,
        config: &WebSocketConfig,
    ) -> Self {
        Self {
            transport,
            shared: Arc::new(Shared {
                state,
                events,
                settings: RwLock::new(WsSettings::from(config)),
            }),
            auth_headers: RwLock::new(AuthHeaderSet::new()),
            target: RwLock::new(None),
            handle: RwLock::new(None),
            lifecycle: Mutex::new(None),
        }
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.shared.state
    }

    /// 연결에 사용할 인증 헤더 교체 (다음 연결부터 적용)
    pub fn set_auth_headers(&self, headers: AuthHeaderSet) {
        *self.auth_headers.write() = headers;
    }

    /// 설정 교체 (다음 연결부터 적용)
    pub fn apply_config(&self, config: &WebSocketConfig) {
        *self.shared.settings.write() = WsSettings::from(config);
    }

    pub fn is_connected(&self) -> bool {
        self.handle
            .read()
            .as_ref()
            .is_some_and(|(_, handle)| handle.is_running())
    }

    /// listen 시작
    ///
    /// 이미 listen 중이면 `stop_active`가 false일 때 아무것도 하지 않고,
    /// true일 때 기존 연결을 닫은 뒤 새로 연결한다.
    pub async fn start_listening(
        &self,
        target: &str,
        stop_active: bool,
        refresh: Option<RefreshCallback>,
        commands_on_connect: Vec<String>,
    ) -> Result<(), CoreError> {
        let mut slot = self.lifecycle.lock().await;
        if self.shared.state.is_listening() {
            if !stop_active {
                debug!("이미 listen 중, 시작 요청 무시");
                return Ok(());
            }
            self.teardown(&mut slot).await;
        }

        *self.target.write() = Some(ListenTarget {
            uri: target.to_string(),
            refresh: refresh.clone(),
            commands: commands_on_connect.clone(),
        });
        self.connect_locked(&mut slot, target, commands_on_connect, refresh)
            .await
    }

    pub async fn stop_listening(&self) {
        let mut slot = self.lifecycle.lock().await;
        self.teardown(&mut slot).await;
        self.shared.mark_listening(false);
    }

    /// 연결 (기존 연결은 먼저 닫음)
    pub async fn connect(
        &self,
        target: &str,
        commands_on_connect: Vec<String>,
    ) -> Result<(), CoreError> {
        let mut slot = self.lifecycle.lock().await;
        let refresh = {
            let mut stored = self.target.write();
            let refresh = stored.as_ref().and_then(|t| t.refresh.clone());
            *stored = Some(ListenTarget {
                uri: target.to_string(),
                refresh: refresh.clone(),
                commands: commands_on_connect.clone(),
            });
            refresh
        };
        self.connect_locked(&mut slot, target, commands_on_connect, refresh)
            .await
    }

    pub async fn disconnect(&self) {
        let mut slot = self.lifecycle.lock().await;
        self.teardown(&mut slot).await;
    }

    /// 핑 전송 (`data`가 있으면 그 값을 직렬화해 전송)
    pub async fn send_ping(&self, data: Option<Value>) -> Result<(), CoreError> {
        let Some((uri, handle)) = self.current() else {
            return self.report(String::new(), CoreError::NotConnected);
        };
        match self.shared.send_ping(handle.as_ref(), data.as_ref()).await {
            Ok(()) => Ok(()),
            Err(e) => self.report(uri, e),
        }
    }

    pub async fn send_command(&self, command: impl Into<String>) -> Result<(), CoreError> {
        let Some((uri, handle)) = self.current() else {
            return self.report(String::new(), CoreError::NotConnected);
        };
        match handle.send(command.into()).await {
            Ok(()) => Ok(()),
            Err(e) => self.report(uri, e),
        }
    }

    /// 핑 명령 문자열 생성
    ///
    /// 고정 명령이 설정되어 있고 `data`가 없으면 고정 명령을 그대로 쓰고,
    /// 아니면 `server.info` JSON-RPC 페이로드(id = 핑 카운터)를 직렬화한다.
    pub fn build_ping_command(&self, data: Option<&Value>) -> Result<String, CoreError> {
        self.shared.build_ping_command(data)
    }

    pub fn set_ping_command(&self, command: impl Into<String>) {
        self.shared.settings.write().ping.command = command.into();
    }

    /// 핑 주기 변경 (listen 중이면 재연결)
    ///
    /// 초 단위로 올림되며 0은 거부된다.
    pub async fn set_ping_interval(&self, interval: Duration) -> Result<(), CoreError> {
        let secs = whole_secs("websocket.ping.interval_secs", interval)?;
        self.shared.settings.write().ping.interval_secs = secs;
        self.restart_if_listening().await
    }

    /// 핑 활성화 변경 (listen 중이면 재연결)
    pub async fn set_ping_enabled(&self, enabled: bool) -> Result<(), CoreError> {
        self.shared.settings.write().ping.enabled = enabled;
        self.restart_if_listening().await
    }

    /// 리프레시 윈도우 변경 (listen 중이면 재연결)
    ///
    /// 초 단위로 올림되며 0은 거부된다.
    pub async fn set_refresh_interval(&self, interval: Duration) -> Result<(), CoreError> {
        let secs = whole_secs("websocket.refresh.interval_secs", interval)?;
        self.shared.settings.write().refresh.interval_secs = secs;
        self.restart_if_listening().await
    }

    async fn restart_if_listening(&self) -> Result<(), CoreError> {
        if !self.shared.state.is_listening() {
            return Ok(());
        }
        let Some(target) = self.target.read().clone() else {
            return Ok(());
        };
        info!("WebSocket 설정 변경, 세션 재시작");
        self.start_listening(&target.uri, true, target.refresh, target.commands)
            .await
    }

    fn current(&self) -> Option<(String, Arc<dyn SocketHandle>)> {
        self.handle.read().clone()
    }

    fn report(&self, uri: String, error: CoreError) -> Result<(), CoreError> {
        self.shared.events.report(
            SessionEvent::WebSocketError {
                uri,
                message: error.to_string(),
            },
            error,
        )
    }

    async fn connect_locked(
        &self,
        slot: &mut Option<ActiveSocket>,
        target: &str,
        commands_on_connect: Vec<String>,
        refresh: Option<RefreshCallback>,
    ) -> Result<(), CoreError> {
        if !is_websocket_uri(target) {
            debug!("WebSocket 대상이 아님, 연결 생략: {}", strip_query(target));
            return Ok(());
        }

        self.teardown(slot).await;

        let auth = self.auth_headers.read().clone();
        let uri = with_auth_segment(target, &auth);
        let headers = auth
            .for_websocket()
            .into_iter()
            .filter(|(_, header)| header.target == AuthHeaderTarget::Header)
            .map(|(name, header)| (name.to_string(), header.token.clone()))
            .collect();

        let settings = self.shared.settings.read().clone();
        let keep_alive = (!settings.ping.enabled && settings.ping.interval_secs > 0)
            .then(|| settings.ping.interval());
        let options = SocketOptions {
            headers,
            keep_alive,
            reconnect_timeout: settings.reconnect_timeout,
        };

        let log_uri = strip_query(&uri).to_string();
        let connection = match self.transport.connect(&uri, options).await {
            Ok(connection) => connection,
            Err(e) => return self.report(log_uri, e),
        };
        let handle = connection.handle;

        self.shared.mark_listening(true);
        self.shared.events.publish(SessionEvent::WebSocketConnected {
            uri: log_uri.clone(),
        });
        info!("WebSocket 세션 시작: {log_uri}");

        send_commands(handle.as_ref(), &commands_on_connect).await;
        self.shared.state.stamp_ping(Instant::now());
        if settings.ping.enabled {
            if let Err(e) = self.shared.send_ping(handle.as_ref(), None).await {
                warn!("초기 핑 전송 실패: {e}");
            }
        }

        let cancel = CancellationToken::new();
        let pump = tokio::spawn(pump(
            Arc::clone(&self.shared),
            Arc::clone(&handle),
            connection.events,
            refresh,
            commands_on_connect,
            log_uri.clone(),
            cancel.clone(),
        ));
        let pinger = settings.ping.enabled.then(|| {
            tokio::spawn(ping_loop(
                Arc::clone(&self.shared),
                Arc::clone(&handle),
                cancel.clone(),
            ))
        });

        *self.handle.write() = Some((log_uri.clone(), Arc::clone(&handle)));
        *slot = Some(ActiveSocket {
            uri: log_uri,
            handle,
            cancel,
            pump,
            pinger,
        });
        Ok(())
    }

    /// 핑 루프 취소 → 짧은 대기 → dispose 순으로 연결 정리
    async fn teardown(&self, slot: &mut Option<ActiveSocket>) {
        let Some(active) = slot.take() else {
            return;
        };
        *self.handle.write() = None;

        active.cancel.cancel();
        tokio::time::sleep(DISPOSE_GRACE).await;
        active.handle.dispose().await;
        active.pump.abort();
        if let Some(pinger) = active.pinger {
            pinger.abort();
        }

        self.shared.mark_listening(false);
        self.shared.events.publish(SessionEvent::WebSocketDisconnected {
            uri: active.uri.clone(),
            info: DisconnectInfo::new("closed by client", Some(1000)),
        });
        info!("WebSocket 세션 종료: {}", active.uri);
    }
}

async fn send_commands(handle: &dyn SocketHandle, commands: &[String]) {
    for command in commands {
        if let Err(e) = handle.send(command.clone()).await {
            warn!("연결 명령 전송 실패: {e}");
        }
    }
}

/// 수신 이벤트 처리 루프
async fn pump(
    shared: Arc<Shared>,
    handle: Arc<dyn SocketHandle>,
    mut events: mpsc::Receiver<SocketEvent>,
    refresh: Option<RefreshCallback>,
    commands_on_connect: Vec<String>,
    uri: String,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            SocketEvent::Reconnected(kind) => {
                shared.mark_listening(true);
                // 최초 연결의 명령/핑은 connect에서 이미 전송
                if kind == ReconnectKind::Lost {
                    info!("WebSocket 재연결됨: {uri}");
                    send_commands(handle.as_ref(), &commands_on_connect).await;
                    if shared.settings.read().ping.enabled {
                        if let Err(e) = shared.send_ping(handle.as_ref(), None).await {
                            warn!("재연결 핑 전송 실패: {e}");
                        }
                    }
                }
            }
            SocketEvent::Message(text) => shared.on_message(text, refresh.as_ref()),
            SocketEvent::Binary(data) => {
                shared.events.publish(SessionEvent::DataReceived { data });
            }
            SocketEvent::Disconnected(info) => {
                shared.mark_listening(false);
                shared.events.publish(SessionEvent::WebSocketDisconnected {
                    uri: uri.clone(),
                    info,
                });
            }
        }
    }
    debug!("WebSocket 수신 루프 종료");
}

/// 핑 루프: 소켓이 살아 있는 동안 주기 도래 여부를 점검
async fn ping_loop(shared: Arc<Shared>, handle: Arc<dyn SocketHandle>, cancel: CancellationToken) {
    loop {
        let interval = shared.settings.read().ping.interval();
        let check = if interval.is_zero() {
            PING_CHECK
        } else {
            interval.min(PING_CHECK)
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(check) => {}
        }
        if !handle.is_running() {
            break;
        }
        if interval.is_zero() || !shared.state.is_listening() {
            continue;
        }

        let now = Instant::now();
        if now.duration_since(shared.state.last_ping_at()) >= interval {
            shared.state.increment_ping_counter();
            shared.state.stamp_ping(now);
            if let Err(e) = shared.send_ping(handle.as_ref(), None).await {
                warn!("핑 전송 실패: {e}");
            }
        }
    }
    debug!("핑 루프 종료");
}

fn is_websocket_uri(target: &str) -> bool {
    url::Url::parse(target)
        .map(|uri| matches!(uri.scheme(), "ws" | "wss"))
        .unwrap_or(false)
}

/// 첫 WebSocket 인증 헤더가 UrlSegment 대상이면 쿼리에 추가
fn with_auth_segment(target: &str, auth: &AuthHeaderSet) -> String {
    match auth.first_for_websocket() {
        Some((name, header)) if header.target == AuthHeaderTarget::UrlSegment => {
            let separator = if target.contains('?') { '&' } else { '?' };
            format!("{target}{separator}{name}={}", header.token)
        }
        _ => target.to_string(),
    }
}
