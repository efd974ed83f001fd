//! 요청 결과 모델.

use serde::de::DeserializeOwned;

use crate::error::CoreError;

/// 응답 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// 2xx + 수신 완료
    Success,
    /// 401/403/203
    AuthFailure,
    /// 409
    Conflict,
    /// 분류되지 않은 HTTP 응답
    Error,
    /// 응답 없음 (전송 실패, 타임아웃)
    NoResponse,
}

/// 요청 1회의 결과 (반환 후 불변)
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub succeeded: bool,
    /// 엔드포인트가 어떤 HTTP 응답이든 돌려줬는지 여부
    pub is_online: bool,
    pub has_auth_error: bool,
    /// 성공 시 UTF-8 본문
    pub result: Option<String>,
    /// 성공 시 원시 본문
    pub raw_bytes: Option<Vec<u8>>,
    /// 상태 문자열 (상태 코드 또는 실패 사유)
    pub status: String,
    pub kind: OutcomeKind,
    pub error: Option<CoreError>,
}

impl RequestOutcome {
    /// 응답을 받지 못한 결과
    pub fn no_response(status: impl Into<String>, error: CoreError) -> Self {
        Self {
            succeeded: false,
            is_online: false,
            has_auth_error: false,
            result: None,
            raw_bytes: None,
            status: status.into(),
            kind: OutcomeKind::NoResponse,
            error: Some(error),
        }
    }

    /// 성공 본문을 `T`로 디코딩
    ///
    /// 본문이 없거나 디코딩에 실패하면 원본 문자열과 대상 타입을 담은
    /// [`CoreError::Conversion`]을 반환한다.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        let body = self.result.as_deref().unwrap_or_default();
        serde_json::from_str(body).map_err(|e| CoreError::Conversion {
            original: body.to_string(),
            target_type: std::any::type_name::<T>().to_string(),
            message: e.to_string(),
        })
    }
}
