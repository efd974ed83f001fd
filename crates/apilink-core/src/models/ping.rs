//! 애플리케이션 레벨 핑 페이로드.

use serde::{Deserialize, Serialize};

/// 핑 메서드 식별자
pub const PING_METHOD: &str = "server.info";

/// JSON-RPC 형식 핑 요청
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingPayload {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// 생성 시점의 핑 카운터
    pub id: i64,
}

impl PingPayload {
    pub fn new(id: i64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: PING_METHOD.to_string(),
            params: serde_json::json!({}),
            id,
        }
    }
}
