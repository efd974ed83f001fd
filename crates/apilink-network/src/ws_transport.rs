//! tokio-tungstenite 기반 WebSocket 전송 어댑터.
//!
//! `SocketTransport` 포트 구현. 연결 1개당 드라이버 태스크 1개가
//! 송신 큐, 수신 스트림, 프로토콜 keep-alive ping을 처리하고,
//! 예기치 않게 끊기면 지수 백오프(1초부터 두 배, `reconnect_timeout` 상한)로
//! 재연결한다.

use apilink_core::error::CoreError;
use apilink_core::models::event::DisconnectInfo;
use apilink_core::ports::socket::{
    ReconnectKind, SocketConnection, SocketEvent, SocketHandle, SocketOptions, SocketTransport,
};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::strip_query;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// 이벤트 채널 용량
const EVENT_CAPACITY: usize = 256;

/// 재연결 백오프 초기값
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// dispose 시 드라이버 종료 대기 상한
const DISPOSE_GRACE: Duration = Duration::from_secs(1);

/// tokio-tungstenite WebSocket 전송
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SocketTransport for TungsteniteTransport {
    async fn connect(
        &self,
        uri: &str,
        options: SocketOptions,
    ) -> Result<SocketConnection, CoreError> {
        let stream = open(uri, &options).await?;
        info!("WebSocket 연결: {}", strip_query(uri));

        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let running = Arc::new(AtomicBool::new(true));

        let driver = tokio::spawn(drive(
            stream,
            Driver {
                uri: uri.to_string(),
                options,
                outbound: outbound_rx,
                events: events_tx,
                cancel: cancel.clone(),
                running: Arc::clone(&running),
            },
        ));

        Ok(SocketConnection {
            handle: Arc::new(TungsteniteHandle {
                outbound: outbound_tx,
                cancel,
                running,
                driver: Mutex::new(Some(driver)),
            }),
            events: events_rx,
        })
    }
}

/// 열린 연결 핸들
pub struct TungsteniteHandle {
    outbound: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl SocketHandle for TungsteniteHandle {
    async fn send(&self, text: String) -> Result<(), CoreError> {
        if !self.is_running() {
            return Err(CoreError::NotConnected);
        }
        self.outbound
            .send(Message::Text(text.into()))
            .map_err(|_| CoreError::NotConnected)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }

    async fn dispose(&self) {
        self.cancel.cancel();
        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            if tokio::time::timeout(DISPOSE_GRACE, driver).await.is_err() {
                warn!("WebSocket 드라이버 종료 대기 시간 초과");
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

/// 핸드셰이크 요청 생성 및 연결
async fn open(uri: &str, options: &SocketOptions) -> Result<WsStream, CoreError> {
    let mut request = uri.into_client_request().map_err(|e| {
        CoreError::Network(format!("WebSocket URI 오류 {}: {e}", strip_query(uri)))
    })?;

    for (name, value) in &options.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| CoreError::Validation {
            field: "header".to_string(),
            message: format!("{name}: {e}"),
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| CoreError::Validation {
            field: name.to_string(),
            message: e.to_string(),
        })?;
        request.headers_mut().insert(name, value);
    }

    let connect = tokio_tungstenite::connect_async(request);
    let result = if options.reconnect_timeout.is_zero() {
        connect.await
    } else {
        tokio::time::timeout(options.reconnect_timeout, connect)
            .await
            .map_err(|_| CoreError::Timeout {
                origin: "websocket.connect".to_string(),
                uri: strip_query(uri).to_string(),
                cancellation_requested: false,
            })?
    };

    let (stream, _response) = result.map_err(|e| {
        CoreError::Network(format!("WebSocket 연결 실패 {}: {e}", strip_query(uri)))
    })?;
    Ok(stream)
}

struct Driver {
    uri: String,
    options: SocketOptions,
    outbound: mpsc::UnboundedReceiver<Message>,
    events: mpsc::Sender<SocketEvent>,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
}

enum ConnectionEnd {
    /// dispose 또는 수신측 종료
    Stopped,
    /// 예기치 않은 끊김
    Lost(DisconnectInfo),
}

async fn drive(stream: WsStream, mut driver: Driver) {
    let mut kind = ReconnectKind::Initial;
    let mut stream = stream;

    loop {
        if driver
            .events
            .send(SocketEvent::Reconnected(kind))
            .await
            .is_err()
        {
            break;
        }

        let (mut sink, mut source) = stream.split();
        match run_connection(&mut sink, &mut source, &mut driver).await {
            ConnectionEnd::Stopped => {
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                break;
            }
            ConnectionEnd::Lost(info) => {
                warn!(
                    "WebSocket 연결 끊김 {}: {}",
                    strip_query(&driver.uri),
                    info.reason
                );
                if driver
                    .events
                    .send(SocketEvent::Disconnected(info))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }

        match reconnect(&driver.uri, &driver.options, &driver.cancel).await {
            Some(next) => {
                info!("WebSocket 재연결: {}", strip_query(&driver.uri));
                stream = next;
                kind = ReconnectKind::Lost;
            }
            None => break,
        }
    }

    driver.running.store(false, Ordering::SeqCst);
    debug!("WebSocket 드라이버 종료");
}

async fn run_connection(
    sink: &mut WsSink,
    source: &mut WsSource,
    driver: &mut Driver,
) -> ConnectionEnd {
    let mut keep_alive = driver.options.keep_alive.filter(|p| !p.is_zero()).map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            _ = driver.cancel.cancelled() => return ConnectionEnd::Stopped,
            outbound = driver.outbound.recv() => {
                let Some(message) = outbound else {
                    return ConnectionEnd::Stopped;
                };
                if let Err(e) = sink.send(message).await {
                    return ConnectionEnd::Lost(DisconnectInfo::new(e.to_string(), None));
                }
            }
            incoming = source.next() => {
                let event = match incoming {
                    Some(Ok(Message::Text(text))) => SocketEvent::Message(text.to_string()),
                    Some(Ok(Message::Binary(data))) => SocketEvent::Binary(data.to_vec()),
                    Some(Ok(Message::Close(frame))) => {
                        let info = match frame {
                            Some(frame) => DisconnectInfo::new(
                                frame.reason.as_str(),
                                Some(u16::from(frame.code)),
                            ),
                            None => DisconnectInfo::new("closed by server", None),
                        };
                        return ConnectionEnd::Lost(info);
                    }
                    // Ping/Pong은 자동 처리
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        return ConnectionEnd::Lost(DisconnectInfo::new(e.to_string(), None));
                    }
                    None => return ConnectionEnd::Lost(DisconnectInfo::new("stream ended", None)),
                };
                if driver.events.send(event).await.is_err() {
                    return ConnectionEnd::Stopped;
                }
            }
            _ = tick(&mut keep_alive) => {
                if let Err(e) = sink.send(Message::Ping(Vec::new().into())).await {
                    return ConnectionEnd::Lost(DisconnectInfo::new(e.to_string(), None));
                }
            }
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// 백오프 재연결 (취소되면 None)
async fn reconnect(
    uri: &str,
    options: &SocketOptions,
    cancel: &CancellationToken,
) -> Option<WsStream> {
    let cap = options.reconnect_timeout.max(INITIAL_BACKOFF);
    let mut delay = INITIAL_BACKOFF;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        let attempt = tokio::select! {
            _ = cancel.cancelled() => return None,
            result = open(uri, options) => result,
        };
        match attempt {
            Ok(stream) => return Some(stream),
            Err(e) => {
                debug!("WebSocket 재연결 실패 ({delay:?} 후 재시도): {e}");
                delay = (delay * 2).min(cap);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    async fn next_event(events: &mut mpsc::Receiver<SocketEvent>) -> SocketEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event timeout")
            .expect("channel closed")
    }

    fn options() -> SocketOptions {
        SocketOptions {
            headers: Vec::new(),
            keep_alive: None,
            reconnect_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn echo_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_text() && ws.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let connection = TungsteniteTransport::new()
            .connect(&format!("ws://{addr}"), options())
            .await
            .unwrap();
        let mut events = connection.events;

        assert_eq!(
            next_event(&mut events).await,
            SocketEvent::Reconnected(ReconnectKind::Initial)
        );

        connection.handle.send("hello".to_string()).await.unwrap();
        assert_eq!(
            next_event(&mut events).await,
            SocketEvent::Message("hello".to_string())
        );

        connection.handle.dispose().await;
        assert!(!connection.handle.is_running());
        assert!(matches!(
            connection.handle.send("late".to_string()).await,
            Err(CoreError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn handshake_headers_are_sent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, mut seen_rx) = mpsc::channel::<Option<String>>(1);
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let value = req
                    .headers()
                    .get("x-api-key")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let _ = seen_tx.try_send(value);
                Ok(resp)
            };
            let _ws = tokio_tungstenite::accept_hdr_async(tcp, callback)
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let mut opts = options();
        opts.headers
            .push(("X-Api-Key".to_string(), "secret".to_string()));
        let connection = TungsteniteTransport::new()
            .connect(&format!("ws://{addr}"), opts)
            .await
            .unwrap();

        assert_eq!(seen_rx.recv().await.unwrap().as_deref(), Some("secret"));
        connection.handle.dispose().await;
    }

    #[tokio::test]
    async fn reconnects_after_server_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // 첫 연결은 바로 닫고, 두 번째 연결은 유지
            let (tcp, _) = listener.accept().await.unwrap();
            let mut first = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let _ = first.close(None).await;

            let (tcp, _) = listener.accept().await.unwrap();
            let mut second = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(_)) = second.next().await {}
        });

        let connection = TungsteniteTransport::new()
            .connect(&format!("ws://{addr}"), options())
            .await
            .unwrap();
        let mut events = connection.events;

        assert_eq!(
            next_event(&mut events).await,
            SocketEvent::Reconnected(ReconnectKind::Initial)
        );
        assert!(matches!(
            next_event(&mut events).await,
            SocketEvent::Disconnected(_)
        ));
        assert_eq!(
            next_event(&mut events).await,
            SocketEvent::Reconnected(ReconnectKind::Lost)
        );

        connection.handle.dispose().await;
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let result = TungsteniteTransport::new()
            .connect(&format!("ws://127.0.0.1:{port}"), options())
            .await;
        assert!(matches!(result, Err(CoreError::Network(_))));
    }
}
