//! 세션 설정 구조체.
//!
//! 서버 URL/API 버전, 기본 타임아웃, 오프라인 재시도, 레이트 리미터,
//! WebSocket 핑/리프레시, 프록시 설정을 정의한다.
//! `ConfigManager`를 통해 JSON 파일에서 로드/저장된다.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CoreError;

/// 최상위 세션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 서버 연결 설정
    pub server: ServerConfig,
    /// 레이트 리미터 설정
    #[serde(default)]
    pub rate_limiter: RateLimiterConfig,
    /// WebSocket 설정
    #[serde(default)]
    pub websocket: WebSocketConfig,
    /// 프록시 설정
    #[serde(default)]
    pub proxy: ProxyConfig,
}

// ============================================================
// 서버 설정
// ============================================================

/// 서버 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// API 서버 기본 URL (예: "https://api.example.com/")
    pub base_url: String,
    /// API 버전 경로 세그먼트 (예: "v1")
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// 기본 요청 타임아웃 (초)
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// 오프라인 판정 전 재확인 횟수
    #[serde(default = "default_retries_when_offline")]
    pub retries_when_offline: u32,
    /// 재확인 프로브의 고정 타임아웃 (초)
    #[serde(default = "default_offline_retry_timeout_secs")]
    pub offline_retry_timeout_secs: u64,
    /// 에러를 이벤트 보고 후 호출자에게도 반환할지 여부
    #[serde(default)]
    pub rethrow_on_error: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_version: default_api_version(),
            default_timeout_secs: default_timeout_secs(),
            retries_when_offline: default_retries_when_offline(),
            offline_retry_timeout_secs: default_offline_retry_timeout_secs(),
            rethrow_on_error: false,
        }
    }
}

// ============================================================
// 레이트 리미터 설정
// ============================================================

/// 토큰 버킷 레이트 리미터 설정
///
/// 생성 후 불변. 교체하면 리미터와 HTTP 전송 클라이언트가 재생성된다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// 리미터 사용 여부 (false면 모든 요청이 리미터를 우회)
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 버킷 최대 토큰 수
    #[serde(default = "default_token_limit")]
    pub token_limit: u32,
    /// 주기당 보충 토큰 수
    #[serde(default = "default_tokens_per_period")]
    pub tokens_per_period: u32,
    /// 보충 주기 (밀리초)
    #[serde(default = "default_replenish_period_ms")]
    pub replenish_period_ms: u64,
    /// 대기열 최대 길이
    #[serde(default = "default_queue_limit")]
    pub queue_limit: u32,
    /// 자동 보충 여부 (false면 `replenish()` 수동 호출)
    #[serde(default = "default_true")]
    pub auto_replenish: bool,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_limit: default_token_limit(),
            tokens_per_period: default_tokens_per_period(),
            replenish_period_ms: default_replenish_period_ms(),
            queue_limit: default_queue_limit(),
            auto_replenish: true,
        }
    }
}

impl RateLimiterConfig {
    /// 보충 주기를 Duration으로 반환
    pub fn replenish_period(&self) -> Duration {
        Duration::from_millis(self.replenish_period_ms)
    }
}

// ============================================================
// WebSocket 설정
// ============================================================

/// WebSocket 세션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// 연결 대상 URI (ws:// 또는 wss://)
    #[serde(default)]
    pub target_uri: String,
    /// 재연결 타임아웃 및 백오프 상한 (초)
    #[serde(default = "default_reconnect_timeout_secs")]
    pub reconnect_timeout_secs: u64,
    /// 핑 설정
    #[serde(default)]
    pub ping: PingConfig,
    /// 리프레시 설정
    #[serde(default)]
    pub refresh: RefreshConfig,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            target_uri: String::new(),
            reconnect_timeout_secs: default_reconnect_timeout_secs(),
            ping: PingConfig::default(),
            refresh: RefreshConfig::default(),
        }
    }
}

/// 애플리케이션 레벨 핑 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingConfig {
    /// 핑 루프 활성화
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 핑 주기 (초)
    #[serde(default = "default_ping_interval_secs")]
    pub interval_secs: u64,
    /// 고정 핑 명령 (비어 있으면 server.info JSON-RPC 페이로드 사용)
    #[serde(default)]
    pub command: String,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_ping_interval_secs(),
            command: String::new(),
        }
    }
}

impl PingConfig {
    /// 핑 주기를 Duration으로 반환
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// 리프레시 주기 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// 리프레시 윈도우 길이 (초)
    #[serde(default = "default_refresh_interval_secs")]
    pub interval_secs: u64,
    /// 콜백 실행 전 경과해야 하는 윈도우 수
    #[serde(default = "default_refresh_count_threshold")]
    pub count_threshold: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_refresh_interval_secs(),
            count_threshold: default_refresh_count_threshold(),
        }
    }
}

impl RefreshConfig {
    /// 리프레시 윈도우를 Duration으로 반환
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

// ============================================================
// 프록시 설정
// ============================================================

/// HTTP 프록시 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// 프록시 사용 여부
    #[serde(default)]
    pub enabled: bool,
    /// 프록시 주소 (스킴 포함 가능)
    #[serde(default)]
    pub address: String,
    /// 프록시 포트
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    /// 스킴이 없는 주소에 https 사용
    #[serde(default = "default_true")]
    pub secure: bool,
    /// 기본 자격증명 사용
    #[serde(default = "default_true")]
    pub use_default_credentials: bool,
    /// 프록시 사용자
    #[serde(default)]
    pub user: String,
    /// 프록시 비밀번호 (파일에 저장하지 않음)
    #[serde(skip)]
    pub password: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: String::new(),
            port: default_proxy_port(),
            secure: true,
            use_default_credentials: true,
            user: String::new(),
            password: None,
        }
    }
}

impl ProxyConfig {
    /// 프록시 적용 여부 (활성화 + 주소 지정)
    pub fn is_active(&self) -> bool {
        self.enabled && !self.address.is_empty()
    }

    /// 프록시 URI 조합
    ///
    /// 주소에 스킴이 있으면 그대로 `{address}:{port}`, 없으면
    /// `secure`에 따라 http/https 스킴을 붙인다.
    pub fn uri(&self) -> String {
        if self.address.starts_with("http://") || self.address.starts_with("https://") {
            format!("{}:{}", self.address, self.port)
        } else {
            let scheme = if self.secure { "https" } else { "http" };
            format!("{scheme}://{}:{}", self.address, self.port)
        }
    }
}

// ============================================================
// SessionConfig impl
// ============================================================

impl SessionConfig {
    /// 기본 설정값 반환
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig {
                base_url: "http://localhost:8000/".to_string(),
                ..ServerConfig::default()
            },
            rate_limiter: RateLimiterConfig::default(),
            websocket: WebSocketConfig::default(),
            proxy: ProxyConfig::default(),
        }
    }

    /// 기본 요청 타임아웃을 Duration으로 반환
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.server.default_timeout_secs)
    }

    /// 오프라인 재확인 타임아웃을 Duration으로 반환
    pub fn offline_retry_timeout(&self) -> Duration {
        Duration::from_secs(self.server.offline_retry_timeout_secs)
    }

    /// 설정값 유효성 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        let base = &self.server.base_url;
        if !base.is_empty() && !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(CoreError::Validation {
                field: "server.base_url".to_string(),
                message: format!("http(s) URL이 아닙니다: {base}"),
            });
        }
        if self.server.default_timeout_secs == 0 {
            return Err(CoreError::Validation {
                field: "server.default_timeout_secs".to_string(),
                message: "0보다 커야 합니다".to_string(),
            });
        }
        if self.server.offline_retry_timeout_secs == 0 {
            return Err(CoreError::Validation {
                field: "server.offline_retry_timeout_secs".to_string(),
                message: "0보다 커야 합니다".to_string(),
            });
        }
        if self.rate_limiter.enabled {
            if self.rate_limiter.token_limit == 0 {
                return Err(CoreError::Validation {
                    field: "rate_limiter.token_limit".to_string(),
                    message: "0보다 커야 합니다".to_string(),
                });
            }
            if self.rate_limiter.replenish_period_ms == 0 {
                return Err(CoreError::Validation {
                    field: "rate_limiter.replenish_period_ms".to_string(),
                    message: "0보다 커야 합니다".to_string(),
                });
            }
        }
        if self.websocket.ping.enabled && self.websocket.ping.interval_secs == 0 {
            return Err(CoreError::Validation {
                field: "websocket.ping.interval_secs".to_string(),
                message: "핑 활성화 시 0보다 커야 합니다".to_string(),
            });
        }
        Ok(())
    }
}

/// Duration을 초 단위 설정값으로 변환
///
/// 1초 미만의 나머지는 올림한다. 0은 거부한다.
pub fn whole_secs(field: &str, value: Duration) -> Result<u64, CoreError> {
    if value.is_zero() {
        return Err(CoreError::Validation {
            field: field.to_string(),
            message: "0보다 커야 합니다".to_string(),
        });
    }
    let secs = value.as_secs();
    if value.subsec_nanos() > 0 {
        Ok(secs.saturating_add(1))
    } else {
        Ok(secs)
    }
}

// ============================================================
// 기본값 함수
// ============================================================

fn default_true() -> bool {
    true
}

fn default_api_version() -> String {
    "v1".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_retries_when_offline() -> u32 {
    2
}
fn default_offline_retry_timeout_secs() -> u64 {
    2
}
fn default_token_limit() -> u32 {
    5
}
fn default_tokens_per_period() -> u32 {
    5
}
fn default_replenish_period_ms() -> u64 {
    30_000
}
fn default_queue_limit() -> u32 {
    u32::MAX
}
fn default_reconnect_timeout_secs() -> u64 {
    15
}
fn default_ping_interval_secs() -> u64 {
    60
}
fn default_refresh_interval_secs() -> u64 {
    5
}
fn default_refresh_count_threshold() -> u32 {
    5
}
fn default_proxy_port() -> u16 {
    443
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default_config();
        assert_eq!(config.server.api_version, "v1");
        assert_eq!(config.default_timeout(), Duration::from_secs(10));
        assert_eq!(config.server.retries_when_offline, 2);
        assert_eq!(config.rate_limiter.token_limit, 5);
        assert_eq!(
            config.rate_limiter.replenish_period(),
            Duration::from_secs(30)
        );
        assert!(config.websocket.ping.enabled);
        assert_eq!(config.websocket.ping.interval(), Duration::from_secs(60));
        assert_eq!(config.websocket.refresh.count_threshold, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let mut config = SessionConfig::default_config();
        config.server.default_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(CoreError::Validation { field, .. }) if field == "server.default_timeout_secs"
        ));

        let mut config = SessionConfig::default_config();
        config.server.offline_retry_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(CoreError::Validation { field, .. }) if field == "server.offline_retry_timeout_secs"
        ));
    }

    #[test]
    fn whole_secs_rounds_up_fractions() {
        assert_eq!(whole_secs("t", Duration::from_millis(500)).unwrap(), 1);
        assert_eq!(whole_secs("t", Duration::from_millis(1500)).unwrap(), 2);
        assert_eq!(whole_secs("t", Duration::from_secs(3)).unwrap(), 3);
        assert!(whole_secs("t", Duration::ZERO).is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{"server":{"base_url":"https://api.example.com/"}}"#;
        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.server.base_url, "https://api.example.com/");
        assert_eq!(config.server.default_timeout_secs, 10);
        assert!(config.rate_limiter.auto_replenish);
        assert_eq!(config.proxy.port, 443);
    }

    #[test]
    fn proxy_password_not_serialized() {
        let mut config = SessionConfig::default_config();
        config.proxy.password = Some("secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn proxy_uri_with_and_without_scheme() {
        let mut proxy = ProxyConfig {
            enabled: true,
            address: "proxy.local".to_string(),
            port: 8080,
            secure: false,
            ..ProxyConfig::default()
        };
        assert_eq!(proxy.uri(), "http://proxy.local:8080");

        proxy.secure = true;
        assert_eq!(proxy.uri(), "https://proxy.local:8080");

        proxy.address = "http://corp-proxy".to_string();
        assert_eq!(proxy.uri(), "http://corp-proxy:8080");
        assert!(proxy.is_active());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = SessionConfig::default_config();
        config.server.base_url = "ftp://example.com".to_string();
        assert!(matches!(
            config.validate(),
            Err(CoreError::Validation { .. })
        ));

        let mut config = SessionConfig::default_config();
        config.rate_limiter.token_limit = 0;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default_config();
        config.websocket.ping.interval_secs = 0;
        assert!(config.validate().is_err());

        config.websocket.ping.enabled = false;
        assert!(config.validate().is_ok());
    }
}
