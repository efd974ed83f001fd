//! 단위 테스트용 전송 더블.

use apilink_core::error::{CoreError, TransportError};
use apilink_core::models::event::DisconnectInfo;
use apilink_core::models::request::HttpRequest;
use apilink_core::models::response::RawResponse;
use apilink_core::ports::socket::{
    ReconnectKind, SocketConnection, SocketEvent, SocketHandle, SocketOptions, SocketTransport,
};
use apilink_core::ports::transport::{ClientSettings, HttpTransport, HttpTransportFactory};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub(crate) fn settings() -> ClientSettings {
    ClientSettings {
        base_uri: "http://test/v1".to_string(),
        default_timeout: Duration::from_secs(10),
        proxy: None,
    }
}

pub(crate) enum Scripted {
    Respond(RawResponse),
    Fail(TransportError),
    Hang,
}

/// 순서대로 응답을 돌려주는 HTTP 전송 (스크립트가 비면 200)
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    pub(crate) requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn with(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<RawResponse, TransportError> {
        self.requests.lock().push(request);
        let next = self.script.lock().pop_front();
        match next {
            Some(Scripted::Respond(raw)) => Ok(raw),
            Some(Scripted::Fail(err)) => Err(err),
            Some(Scripted::Hang) => std::future::pending().await,
            None => Ok(RawResponse::completed(200, Vec::new())),
        }
    }

    fn build_uri(&self, request: &HttpRequest) -> String {
        format!("http://test/v1/{}", request.path)
    }
}

/// 항상 같은 전송을 돌려주는 팩토리
pub(crate) struct SharedFactory {
    transport: Arc<ScriptedTransport>,
    created: AtomicUsize,
}

impl SharedFactory {
    pub(crate) fn new(transport: Arc<ScriptedTransport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            created: AtomicUsize::new(0),
        })
    }

    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl HttpTransportFactory for SharedFactory {
    fn create(&self, _settings: &ClientSettings) -> Result<Arc<dyn HttpTransport>, CoreError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.transport.clone())
    }
}

/// 인메모리 WebSocket 연결
pub(crate) struct FakeSocket {
    pub(crate) sent: Mutex<Vec<String>>,
    running: AtomicBool,
    events: mpsc::Sender<SocketEvent>,
}

impl FakeSocket {
    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// 서버 → 클라이언트 이벤트 주입
    pub(crate) async fn push(&self, event: SocketEvent) {
        let _ = self.events.send(event).await;
    }
}

#[async_trait]
impl SocketHandle for FakeSocket {
    async fn send(&self, text: String) -> Result<(), CoreError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(CoreError::NotConnected);
        }
        self.sent.lock().push(text);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn dispose(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            let _ = self
                .events
                .send(SocketEvent::Disconnected(DisconnectInfo::new(
                    "disposed",
                    Some(1000),
                )))
                .await;
        }
    }
}

/// 연결 요청을 기록하는 인메모리 WebSocket 전송
#[derive(Default)]
pub(crate) struct FakeSocketTransport {
    pub(crate) connections: Mutex<Vec<(String, SocketOptions, Arc<FakeSocket>)>>,
    pub(crate) refuse: AtomicBool,
}

impl FakeSocketTransport {
    pub(crate) fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    pub(crate) fn last(&self) -> Option<(String, SocketOptions, Arc<FakeSocket>)> {
        self.connections.lock().last().cloned()
    }
}

#[async_trait]
impl SocketTransport for FakeSocketTransport {
    async fn connect(
        &self,
        uri: &str,
        options: SocketOptions,
    ) -> Result<SocketConnection, CoreError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(CoreError::Network(format!("{uri}: connection refused")));
        }
        let (tx, rx) = mpsc::channel(64);
        let _ = tx.send(SocketEvent::Reconnected(ReconnectKind::Initial)).await;
        let socket = Arc::new(FakeSocket {
            sent: Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
            events: tx,
        });
        self.connections
            .lock()
            .push((uri.to_string(), options, socket.clone()));
        Ok(SocketConnection {
            handle: socket,
            events: rx,
        })
    }
}
