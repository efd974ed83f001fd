//! HTTP 전송 포트.
//!
//! 구현: `apilink-network` crate (reqwest)

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ProxyConfig, SessionConfig};
use crate::error::{CoreError, TransportError};
use crate::models::request::HttpRequest;
use crate::models::response::RawResponse;

/// 전송 클라이언트 생성 설정
///
/// 값이 바뀌면 전송 클라이언트를 재생성해야 한다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// `{base_url}/{api_version}` (끝 슬래시 없음)
    pub base_uri: String,
    pub default_timeout: Duration,
    /// 활성화된 프록시 (None이면 직접 연결)
    pub proxy: Option<ProxyConfig>,
}

impl ClientSettings {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            base_uri: compose_base_uri(&config.server.base_url, &config.server.api_version),
            default_timeout: config.default_timeout(),
            proxy: config.proxy.is_active().then(|| config.proxy.clone()),
        }
    }

    /// 상대 경로를 전체 URI로 변환 (쿼리 제외)
    pub fn resolve(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            self.base_uri.clone()
        } else {
            format!("{}/{}", self.base_uri, path)
        }
    }
}

/// 기본 URL과 API 버전 결합
///
/// `("https://api.example.com/", "v1")` → `"https://api.example.com/v1"`
pub fn compose_base_uri(base_url: &str, api_version: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let version = api_version.trim_matches('/');
    if version.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{version}")
    }
}

/// HTTP 실행 프리미티브
///
/// 취소는 반환된 future를 drop하는 것으로 표현한다.
/// 세션 레이어가 데드라인/취소 토큰과 함께 `select`한다.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// 요청 실행
    ///
    /// 상태 코드가 있는 응답은 4xx/5xx라도 `Ok`로 반환한다.
    /// 응답을 전혀 받지 못한 경우에만 `Err`.
    async fn execute(&self, request: HttpRequest) -> Result<RawResponse, TransportError>;

    /// 쿼리 포함 전체 URI (로그/진단용)
    fn build_uri(&self, request: &HttpRequest) -> String;
}

/// 전송 클라이언트 팩토리
pub trait HttpTransportFactory: Send + Sync {
    fn create(&self, settings: &ClientSettings) -> Result<Arc<dyn HttpTransport>, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_handles_slashes() {
        assert_eq!(
            compose_base_uri("https://api.example.com/", "v1"),
            "https://api.example.com/v1"
        );
        assert_eq!(
            compose_base_uri("https://api.example.com", "/v2/"),
            "https://api.example.com/v2"
        );
        assert_eq!(
            compose_base_uri("https://api.example.com/", ""),
            "https://api.example.com"
        );
    }

    #[test]
    fn resolve_paths() {
        let settings = ClientSettings {
            base_uri: "https://api.example.com/v1".to_string(),
            default_timeout: Duration::from_secs(10),
            proxy: None,
        };
        assert_eq!(settings.resolve(""), "https://api.example.com/v1");
        assert_eq!(
            settings.resolve("printer/info"),
            "https://api.example.com/v1/printer/info"
        );
        assert_eq!(
            settings.resolve("/printer"),
            "https://api.example.com/v1/printer"
        );
    }

    #[test]
    fn inactive_proxy_is_dropped() {
        let mut config = SessionConfig::default_config();
        config.proxy.enabled = true;
        assert!(ClientSettings::from_config(&config).proxy.is_none());

        config.proxy.address = "proxy.local".to_string();
        assert!(ClientSettings::from_config(&config).proxy.is_some());
    }
}
