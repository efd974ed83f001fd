//! reqwest 기반 HTTP 전송 어댑터.
//!
//! `HttpTransport` / `HttpTransportFactory` 포트 구현.
//! 상태 코드가 있는 응답은 모두 `RawResponse`로 돌려주고,
//! 분류는 세션 레이어의 분류기가 담당한다.

use apilink_core::config::ProxyConfig;
use apilink_core::error::{CoreError, TransportError};
use apilink_core::models::request::{content_type, HttpMethod, HttpRequest};
use apilink_core::models::response::{CompletionState, RawResponse};
use apilink_core::ports::transport::{ClientSettings, HttpTransport, HttpTransportFactory};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::sync::Arc;
use tracing::{debug, trace};
use url::Url;

/// reqwest HTTP 전송 클라이언트
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    settings: ClientSettings,
}

impl ReqwestTransport {
    /// 설정으로 클라이언트 생성
    pub fn new(settings: &ClientSettings) -> Result<Self, CoreError> {
        let mut builder = reqwest::Client::builder()
            .timeout(settings.default_timeout)
            .tcp_nodelay(true);

        if let Some(proxy) = &settings.proxy {
            builder = builder.proxy(build_proxy(proxy)?);
            debug!("HTTP 프록시 사용: {}:{}", proxy.address, proxy.port);
        }

        let client = builder
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {e}")))?;

        Ok(Self {
            client,
            settings: settings.clone(),
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    fn full_url(&self, request: &HttpRequest) -> Result<Url, TransportError> {
        let raw = self.settings.resolve(&request.path);
        let mut url = Url::parse(&raw)
            .map_err(|e| TransportError::Request(format!("URL 파싱 실패 {raw}: {e}")))?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

fn build_proxy(proxy: &ProxyConfig) -> Result<reqwest::Proxy, CoreError> {
    let uri = proxy.uri();
    let mut built = reqwest::Proxy::all(&uri)
        .map_err(|e| CoreError::Config(format!("프록시 주소 오류 {uri}: {e}")))?;
    if !proxy.user.is_empty() {
        built = built.basic_auth(&proxy.user, proxy.password.as_deref().unwrap_or_default());
    }
    Ok(built)
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Options => reqwest::Method::OPTIONS,
    }
}

fn map_send_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<RawResponse, TransportError> {
        let url = self.full_url(&request)?;

        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), url)
            .timeout(request.timeout)
            .header(ACCEPT, content_type::ANY);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = request.body {
            builder = builder
                .header(CONTENT_TYPE, body.content_type)
                .body(body.bytes);
        }

        let built = builder
            .build()
            .map_err(|e| TransportError::Request(format!("요청 빌드 실패: {e}")))?;
        trace!("{built:?}");

        let response = self.client.execute(built).await.map_err(map_send_error)?;
        let status = response.status().as_u16();

        match response.bytes().await {
            Ok(bytes) => Ok(RawResponse::completed(status, bytes.to_vec())),
            Err(e) => {
                let completion = if e.is_timeout() {
                    CompletionState::TimedOut
                } else {
                    CompletionState::Error
                };
                Ok(RawResponse::incomplete(status, completion, e.to_string()))
            }
        }
    }

    fn build_uri(&self, request: &HttpRequest) -> String {
        match self.full_url(request) {
            Ok(url) => url.to_string(),
            Err(_) => self.settings.resolve(&request.path),
        }
    }
}

/// reqwest 전송 클라이언트 팩토리
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestTransportFactory;

impl HttpTransportFactory for ReqwestTransportFactory {
    fn create(&self, settings: &ClientSettings) -> Result<Arc<dyn HttpTransport>, CoreError> {
        Ok(Arc::new(ReqwestTransport::new(settings)?))
    }
}
