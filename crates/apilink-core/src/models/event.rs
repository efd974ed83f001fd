//! 세션 이벤트 모델.
//!
//! 에러 채널, 인증 결과, WebSocket 수명주기, 수신 메시지 등
//! 애플리케이션이 구독하는 모든 이벤트를 하나의 enum으로 정의한다.

use chrono::{DateTime, Utc};

use crate::error::CoreError;

/// WebSocket 연결 종료 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectInfo {
    /// 종료 사유 (close frame reason 또는 에러 메시지)
    pub reason: String,
    /// close 상태 코드
    pub code: Option<u16>,
}

impl DisconnectInfo {
    pub fn new(reason: impl Into<String>, code: Option<u16>) -> Self {
        Self {
            reason: reason.into(),
            code,
        }
    }
}

/// 세션 이벤트
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// 일반 에러 (전송 실패 등)
    Error(CoreError),
    /// 분류되지 않은 REST 에러 (상태 + 메시지 + URI)
    RestError {
        error: CoreError,
        is_online: bool,
    },
    /// 인증 실패 (401/403/203)
    AuthenticationError { uri: String, status: String },
    /// 인증 실패 이후 첫 성공
    AuthenticationSucceeded,
    /// 요청 타임아웃/취소
    TaskCanceled {
        origin: String,
        uri: String,
        cancellation_requested: bool,
    },
    /// 응답 본문 변환 실패
    JsonConvertError {
        original: String,
        target_type: String,
        message: String,
    },
    WebSocketConnected { uri: String },
    WebSocketDisconnected { uri: String, info: DisconnectInfo },
    WebSocketError { uri: String, message: String },
    /// 텍스트 프레임 수신 (`callback_id`는 수신 시점의 핑 카운터)
    MessageReceived {
        callback_id: i64,
        message: String,
        session_id: String,
    },
    /// 바이너리 프레임 수신
    DataReceived { data: Vec<u8> },
    PingSent {
        timestamp: DateTime<Utc>,
        command: String,
    },
    SessionChanged { session_id: String },
    ListeningChanged {
        session_id: String,
        is_listening: bool,
    },
    OnlineChanged { is_online: bool },
}

impl SessionEvent {
    /// 에러 이벤트로 변환
    ///
    /// 타임아웃과 변환 에러는 전용 채널로 보낸다.
    pub fn from_error(error: CoreError) -> Self {
        match error {
            CoreError::Timeout {
                origin,
                uri,
                cancellation_requested,
            } => SessionEvent::TaskCanceled {
                origin,
                uri,
                cancellation_requested,
            },
            CoreError::Conversion {
                original,
                target_type,
                message,
            } => SessionEvent::JsonConvertError {
                original,
                target_type,
                message,
            },
            other => SessionEvent::Error(other),
        }
    }

    /// 에러 계열 이벤트 여부
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            SessionEvent::Error(_)
                | SessionEvent::RestError { .. }
                | SessionEvent::AuthenticationError { .. }
                | SessionEvent::TaskCanceled { .. }
                | SessionEvent::JsonConvertError { .. }
                | SessionEvent::WebSocketError { .. }
        )
    }
}
