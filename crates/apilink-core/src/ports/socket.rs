//! WebSocket 전송 포트.
//!
//! 구현: `apilink-network` crate (tokio-tungstenite)
//!
//! 재연결은 전송 어댑터가 담당하고, 결과는 [`SocketEvent::Reconnected`]로 알린다.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::models::event::DisconnectInfo;

/// 연결 수립 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectKind {
    /// 최초 연결
    Initial,
    /// 예기치 않은 끊김 후 재연결
    Lost,
}

/// 전송 어댑터가 보내는 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// 텍스트 프레임
    Message(String),
    /// 바이너리 프레임
    Binary(Vec<u8>),
    /// 연결 수립 (최초 또는 재연결)
    Reconnected(ReconnectKind),
    /// 연결 끊김 (재연결 대기 중일 수 있음)
    Disconnected(DisconnectInfo),
}

/// 연결 옵션
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocketOptions {
    /// 핸드셰이크 헤더
    pub headers: Vec<(String, String)>,
    /// 프로토콜 레벨 ping 주기 (None이면 비활성)
    pub keep_alive: Option<Duration>,
    /// 연결 타임아웃 및 재연결 백오프 상한
    pub reconnect_timeout: Duration,
}

/// 열린 연결 핸들
#[async_trait]
pub trait SocketHandle: Send + Sync {
    /// 텍스트 프레임 전송
    async fn send(&self, text: String) -> Result<(), CoreError>;

    /// 연결(또는 재연결 루프)이 살아 있는지 여부
    fn is_running(&self) -> bool;

    /// 연결 종료 (재연결 중단)
    async fn dispose(&self);
}

/// 연결 결과: 핸들 + 이벤트 스트림
pub struct SocketConnection {
    pub handle: Arc<dyn SocketHandle>,
    pub events: mpsc::Receiver<SocketEvent>,
}

impl std::fmt::Debug for SocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketConnection")
            .field("running", &self.handle.is_running())
            .finish()
    }
}

/// WebSocket 연결 프리미티브
#[async_trait]
pub trait SocketTransport: Send + Sync {
    /// 최초 연결 수립
    ///
    /// 성공하면 이벤트 스트림의 첫 이벤트는 `Reconnected(Initial)`이다.
    async fn connect(&self, uri: &str, options: SocketOptions)
        -> Result<SocketConnection, CoreError>;
}
