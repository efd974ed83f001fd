//! 응답 분류기.
//!
//! 원시 응답(상태 코드 + 전송 완료 상태)을 [`RequestOutcome`]으로 정규화한다.
//! 어떤 HTTP 응답이든 받았다면 엔드포인트는 살아 있는 것으로 본다.

use apilink_core::error::CoreError;
use apilink_core::models::outcome::{OutcomeKind, RequestOutcome};
use apilink_core::models::response::RawResponse;

/// 성공으로 보는 상태 코드 (OK, Created, Accepted, NoContent)
const SUCCESS_CODES: [u16; 4] = [200, 201, 202, 204];

/// 인증 실패로 보는 상태 코드 (Unauthorized, Forbidden, NonAuthoritative)
const AUTH_FAILURE_CODES: [u16; 3] = [401, 403, 203];

const CONFLICT: u16 = 409;

/// 응답 분류
pub fn classify(response: &RawResponse, uri: &str) -> RequestOutcome {
    let status = response.status_label();

    if SUCCESS_CODES.contains(&response.status) && response.is_completed() {
        return RequestOutcome {
            succeeded: true,
            is_online: true,
            has_auth_error: false,
            result: Some(response.content.clone().unwrap_or_default()),
            raw_bytes: Some(response.raw_bytes.clone()),
            status,
            kind: OutcomeKind::Success,
            error: None,
        };
    }

    if AUTH_FAILURE_CODES.contains(&response.status) {
        return RequestOutcome {
            succeeded: false,
            is_online: true,
            has_auth_error: true,
            result: None,
            raw_bytes: None,
            error: Some(CoreError::Auth(format!("{uri} ({status})"))),
            status,
            kind: OutcomeKind::AuthFailure,
        };
    }

    if response.status == CONFLICT {
        return RequestOutcome {
            succeeded: false,
            is_online: true,
            has_auth_error: false,
            result: response.content.clone(),
            raw_bytes: None,
            status,
            kind: OutcomeKind::Conflict,
            error: None,
        };
    }

    let message = response
        .error_message
        .clone()
        .or_else(|| response.content.clone())
        .unwrap_or_default();
    RequestOutcome {
        succeeded: false,
        is_online: true,
        has_auth_error: false,
        result: None,
        raw_bytes: None,
        error: Some(CoreError::Http {
            status: status.clone(),
            message,
            uri: uri.to_string(),
        }),
        status,
        kind: OutcomeKind::Error,
    }
}
