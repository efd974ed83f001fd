//! # apilink-core
//!
//! apilink 도메인 모델, 포트(trait) 정의, 에러 타입, 설정.
//! 세션 엔진과 전송 어댑터가 공유하는 핵심 타입과 인터페이스를 제공한다.
//!
//! ## 구조
//!
//! - [`models`]: 인증 헤더, 요청/응답/결과, 세션 상태, 이벤트
//! - [`ports`]: HTTP/WebSocket 전송 포트 인터페이스 (async_trait)
//! - [`error`]: 핵심 에러 타입 (thiserror)
//! - [`config`]: 세션 설정 구조체
//! - [`config_manager`]: 설정 파일 관리 (로드/저장)

pub mod config;
pub mod config_manager;
pub mod error;
pub mod models;
pub mod ports;
