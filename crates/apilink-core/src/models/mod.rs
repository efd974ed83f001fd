//! apilink 도메인 모델.
//!
//! 인증 헤더, 요청/응답/결과, 공유 세션 상태, 세션 이벤트, 핑 페이로드를 정의한다.

pub mod auth;
pub mod event;
pub mod outcome;
pub mod ping;
pub mod request;
pub mod response;
pub mod session;
