//! 포트 인터페이스 (trait).
//!
//! 세션 레이어가 소비하는 외부 협력자 경계.
//! `apilink-network`가 reqwest/tokio-tungstenite 어댑터로 구현하고,
//! 테스트는 인메모리 더블로 대체한다.
//!
//! 모든 async trait은 `async_trait` 매크로로 object safety를 보장한다.

pub mod socket;
pub mod transport;
