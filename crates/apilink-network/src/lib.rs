//! # apilink-network
//!
//! REST/WebSocket 세션 엔진과 전송 어댑터.
//! 레이트 리미터로 입장을 제어하는 REST 실행, 응답 분류,
//! 히스테리시스가 적용된 온라인 추적, 핑/리프레시 루프를 가진
//! WebSocket 세션을 [`controller::SessionController`]로 묶는다.
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! use apilink_network::controller::SessionController;
//! use apilink_core::models::request::RestRequest;
//!
//! let controller = SessionController::builder()
//!     .with_web_address("https://api.example.com/")
//!     .with_version("v1")
//!     .with_api_key("secret")
//!     .build()?;
//!
//! let mut events = controller.subscribe();
//! let outcome = controller.execute(RestRequest::get("items")).await?;
//! ```

pub mod classifier;
pub mod controller;
pub mod event_hub;
pub mod http_transport;
pub mod online;
pub mod rate_limiter;
pub mod rest_session;
pub mod ws_session;
pub mod ws_transport;

#[cfg(test)]
mod test_support;

/// 로그용 URI (쿼리 문자열의 토큰 제거)
pub(crate) fn strip_query(uri: &str) -> &str {
    uri.split('?').next().unwrap_or(uri)
}
