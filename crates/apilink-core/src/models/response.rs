//! 전송 계층 원시 응답.

use std::fmt;

/// 전송 완료 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompletionState {
    /// 응답 수신 완료
    #[default]
    Completed,
    /// 응답 수신 중 전송 오류
    Error,
    /// 응답 수신 중 데드라인 만료
    TimedOut,
    /// 응답 수신 중 취소
    Aborted,
}

impl fmt::Display for CompletionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompletionState::Completed => "Completed",
            CompletionState::Error => "Error",
            CompletionState::TimedOut => "TimedOut",
            CompletionState::Aborted => "Aborted",
        };
        f.write_str(name)
    }
}

/// HTTP 전송 포트가 반환하는 원시 응답
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP 상태 코드
    pub status: u16,
    pub completion: CompletionState,
    /// UTF-8 본문 (디코딩 실패 시 None)
    pub content: Option<String>,
    pub raw_bytes: Vec<u8>,
    /// 전송 계층 에러 메시지 (본문 수신 실패 등)
    pub error_message: Option<String>,
}

impl RawResponse {
    /// 수신 완료된 응답 생성
    pub fn completed(status: u16, raw_bytes: Vec<u8>) -> Self {
        let content = String::from_utf8(raw_bytes.clone()).ok();
        Self {
            status,
            completion: CompletionState::Completed,
            content,
            raw_bytes,
            error_message: None,
        }
    }

    /// 상태 코드는 받았지만 본문 수신이 실패한 응답 생성
    pub fn incomplete(
        status: u16,
        completion: CompletionState,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            completion,
            content: None,
            raw_bytes: Vec::new(),
            error_message: Some(message.into()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completion == CompletionState::Completed
    }

    /// 보고용 상태 문자열 (`"200"`, `"500 (Error)"`)
    pub fn status_label(&self) -> String {
        if self.is_completed() {
            self.status.to_string()
        } else {
            format!("{} ({})", self.status, self.completion)
        }
    }
}
