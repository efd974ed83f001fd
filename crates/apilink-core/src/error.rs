//! apilink 핵심 에러 타입.
//!
//! 네트워크 어댑터는 전송 계층 실패를 [`TransportError`]로 반환하고,
//! 세션 레이어는 이를 [`CoreError`]로 변환해 에러 채널에 보고한다.

use thiserror::Error;

/// 코어 레이어 에러.
/// 직렬화, 설정, 인증, 전송, 변환 등 세션 공통 에러를 정의한다.
///
/// 이벤트 채널로 브로드캐스트되므로 `Clone`이어야 한다.
/// 원본 에러는 메시지로만 보존한다.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// 필드 유효성 검증 실패
    #[error("유효성 검증 실패 ({field}): {message}")]
    Validation {
        /// 검증 실패한 필드명
        field: String,
        /// 실패 사유
        message: String,
    },

    /// 인증 실패 (401/403/203)
    #[error("인증 에러: {0}")]
    Auth(String),

    /// 네트워크 에러 (연결 거부, DNS, TLS)
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 요청 타임아웃 또는 취소
    #[error("요청 취소 ({origin}): {uri}")]
    Timeout {
        /// 취소가 발생한 작업 이름
        origin: String,
        /// 요청 URI
        uri: String,
        /// 명시적 취소 요청 여부 (false면 데드라인 만료)
        cancellation_requested: bool,
    },

    /// 문자열 → 타입 변환 실패
    #[error("{target_type} 변환 실패: {message}")]
    Conversion {
        /// 변환하려던 원본 문자열
        original: String,
        /// 대상 타입 이름
        target_type: String,
        /// 실패 사유
        message: String,
    },

    /// 분류되지 않은 HTTP 에러
    #[error("HTTP 에러 ({status}) {uri}: {message}")]
    Http {
        /// 상태 코드 (전송 완료 상태 포함)
        status: String,
        /// 응답 본문 또는 에러 메시지
        message: String,
        /// 요청 URI
        uri: String,
    },

    /// 레이트 리미터 큐 초과
    #[error("요청 한도 초과: 대기열이 가득 찼습니다")]
    RateLimited,

    /// 활성 WebSocket 연결 없음
    #[error("WebSocket 미연결")]
    NotConnected,

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io(err.to_string())
    }
}

impl CoreError {
    /// 타임아웃/취소 에러 여부
    pub fn is_timeout(&self) -> bool {
        matches!(self, CoreError::Timeout { .. })
    }
}

/// HTTP 전송 포트 에러.
///
/// 응답을 전혀 받지 못한 경우에만 사용한다. 상태 코드가 있는 응답은
/// 에러가 아니라 [`crate::models::response::RawResponse`]로 반환된다.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// 데드라인 만료
    #[error("요청 타임아웃")]
    Timeout,

    /// 취소 토큰에 의한 취소
    #[error("요청 취소됨")]
    Cancelled,

    /// 연결 수립 실패 (거부, DNS, TLS)
    #[error("연결 실패: {0}")]
    Connect(String),

    /// 그 외 요청 실패
    #[error("요청 실패: {0}")]
    Request(String),
}

impl TransportError {
    /// `CoreError`로 변환 (URI/작업 이름 부착)
    pub fn into_core(self, origin: &str, uri: &str) -> CoreError {
        match self {
            TransportError::Timeout => CoreError::Timeout {
                origin: origin.to_string(),
                uri: uri.to_string(),
                cancellation_requested: false,
            },
            TransportError::Cancelled => CoreError::Timeout {
                origin: origin.to_string(),
                uri: uri.to_string(),
                cancellation_requested: true,
            },
            TransportError::Connect(msg) | TransportError::Request(msg) => {
                CoreError::Network(format!("{uri}: {msg}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_timeout_maps_to_core_timeout() {
        let err = TransportError::Timeout.into_core("execute", "https://api.example.com/v1");
        match err {
            CoreError::Timeout {
                origin,
                cancellation_requested,
                ..
            } => {
                assert_eq!(origin, "execute");
                assert!(!cancellation_requested);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn transport_cancel_sets_requested_flag() {
        let err = TransportError::Cancelled.into_core("probe", "uri");
        assert!(err.is_timeout());
        assert!(matches!(
            err,
            CoreError::Timeout {
                cancellation_requested: true,
                ..
            }
        ));
    }

    #[test]
    fn serde_error_converts_with_question_mark() {
        fn parse(raw: &str) -> Result<serde_json::Value, CoreError> {
            Ok(serde_json::from_str(raw)?)
        }
        let err = parse("{not json").unwrap_err();
        assert!(matches!(err, CoreError::Serialization(_)));
    }

    #[test]
    fn connect_error_maps_to_network() {
        let err = TransportError::Connect("refused".to_string()).into_core("execute", "http://x");
        let msg = format!("{err}");
        assert!(msg.contains("네트워크"));
        assert!(msg.contains("refused"));
    }
}
