//! 요청 모델.
//!
//! [`RestRequest`]는 호출자가 조립하는 고수준 요청이고,
//! [`HttpRequest`]는 인증/본문 인코딩이 끝난 뒤 전송 포트로 넘어가는 요청이다.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::error::CoreError;
use crate::models::auth::AuthHeaderSet;

/// 콘텐츠 타입 상수
pub mod content_type {
    pub const ANY: &str = "*/*";
    pub const PLAIN: &str = "text/plain";
    pub const XML: &str = "application/xml";
    pub const JSON: &str = "application/json";
    pub const OCTET_STREAM: &str = "application/octet-stream";
}

/// HTTP 메서드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 본문 인코딩 형식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyFormat {
    #[default]
    Json,
    Plain,
    Xml,
    Binary,
}

/// 요청 본문
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// 문자열 (선택한 형식으로 그대로 전송)
    Text(String),
    /// 구조화된 JSON 값 (Json 형식에서 직렬화)
    Json(serde_json::Value),
    /// 바이트 (Binary 형식)
    Bytes(Vec<u8>),
}

impl RequestBody {
    /// 형식에 맞게 본문 인코딩
    ///
    /// 형식과 맞지 않는 본문은 전송하지 않는다 (`Ok(None)`).
    pub fn encode(&self, format: BodyFormat) -> Result<Option<EncodedBody>, CoreError> {
        let encoded = match (format, self) {
            (BodyFormat::Json, RequestBody::Text(text)) => {
                Some(EncodedBody::new(text.as_bytes().to_vec(), content_type::JSON))
            }
            (BodyFormat::Json, RequestBody::Json(value)) => Some(EncodedBody::new(
                serde_json::to_vec(value)?,
                content_type::JSON,
            )),
            (BodyFormat::Json, RequestBody::Bytes(bytes)) => {
                Some(EncodedBody::new(bytes.clone(), content_type::JSON))
            }
            (BodyFormat::Plain, RequestBody::Text(text)) => {
                Some(EncodedBody::new(text.as_bytes().to_vec(), content_type::PLAIN))
            }
            (BodyFormat::Xml, RequestBody::Text(xml)) => {
                Some(EncodedBody::new(xml.as_bytes().to_vec(), content_type::XML))
            }
            (BodyFormat::Xml, RequestBody::Json(_)) => {
                return Err(CoreError::Validation {
                    field: "body".to_string(),
                    message: "XML 본문은 문자열로 전달해야 합니다".to_string(),
                });
            }
            (BodyFormat::Binary, RequestBody::Bytes(bytes)) => {
                Some(EncodedBody::new(bytes.clone(), content_type::OCTET_STREAM))
            }
            _ => None,
        };
        Ok(encoded)
    }
}

impl From<String> for RequestBody {
    fn from(value: String) -> Self {
        RequestBody::Text(value)
    }
}

impl From<&str> for RequestBody {
    fn from(value: &str) -> Self {
        RequestBody::Text(value.to_string())
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(value: Vec<u8>) -> Self {
        RequestBody::Bytes(value)
    }
}

/// 인코딩된 본문
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

impl EncodedBody {
    fn new(bytes: Vec<u8>, content_type: &'static str) -> Self {
        Self {
            bytes,
            content_type,
        }
    }
}

/// 고수준 REST 요청
#[derive(Debug, Clone, Default)]
pub struct RestRequest {
    /// 대상 경로 (클라이언트 기본 URL 기준)
    pub target_uri: String,
    pub method: HttpMethod,
    /// 대상 경로 뒤에 붙는 명령 (비어 있으면 생략)
    pub command: String,
    pub auth_headers: AuthHeaderSet,
    pub body: Option<RequestBody>,
    pub body_format: BodyFormat,
    /// None이면 세션 기본 타임아웃
    pub timeout: Option<Duration>,
    /// 추가 쿼리 파라미터
    pub url_segments: Vec<(String, String)>,
}

impl RestRequest {
    pub fn new(method: HttpMethod, target_uri: impl Into<String>) -> Self {
        Self {
            target_uri: target_uri.into(),
            method,
            ..Self::default()
        }
    }

    pub fn get(target_uri: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, target_uri)
    }

    pub fn post(target_uri: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, target_uri)
    }

    pub fn put(target_uri: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, target_uri)
    }

    pub fn patch(target_uri: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, target_uri)
    }

    pub fn delete(target_uri: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, target_uri)
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_auth(mut self, auth_headers: AuthHeaderSet) -> Self {
        self.auth_headers = auth_headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// 직렬화 가능한 값을 JSON 본문으로 설정
    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, CoreError> {
        self.body = Some(RequestBody::Json(serde_json::to_value(value)?));
        self.body_format = BodyFormat::Json;
        Ok(self)
    }

    pub fn with_format(mut self, format: BodyFormat) -> Self {
        self.body_format = format;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.url_segments.push((key.into(), value.into()));
        self
    }

    /// 요청 경로: 명령이 있으면 `{target_uri}/{command}`, 없으면 `target_uri`
    pub fn path(&self) -> String {
        if self.command.is_empty() {
            self.target_uri.clone()
        } else {
            format!("{}/{}", self.target_uri, self.command)
        }
    }
}

/// 전송 포트로 전달되는 조립 완료 요청
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// 클라이언트 기본 URL 기준 상대 경로
    pub path: String,
    /// 쿼리 파라미터 (적용 순서 유지)
    pub query: Vec<(String, String)>,
    /// 헤더 (적용 순서 유지)
    pub headers: Vec<(String, String)>,
    pub body: Option<EncodedBody>,
    pub timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_with_and_without_command() {
        let req = RestRequest::get("printer").with_command("info");
        assert_eq!(req.path(), "printer/info");

        let req = RestRequest::get("printer");
        assert_eq!(req.path(), "printer");

        let req = RestRequest::get("");
        assert_eq!(req.path(), "");
    }

    #[test]
    fn json_text_body_is_sent_verbatim() {
        let body = RequestBody::from(r#"{"a":1}"#);
        let encoded = body.encode(BodyFormat::Json).unwrap().unwrap();
        assert_eq!(encoded.bytes, br#"{"a":1}"#.to_vec());
        assert_eq!(encoded.content_type, content_type::JSON);
    }

    #[test]
    fn json_value_body_is_serialized() {
        let body = RequestBody::from(serde_json::json!({"id": 7}));
        let encoded = body.encode(BodyFormat::Json).unwrap().unwrap();
        assert_eq!(String::from_utf8(encoded.bytes).unwrap(), r#"{"id":7}"#);
    }

    #[test]
    fn mismatched_format_drops_body() {
        let body = RequestBody::Bytes(vec![1, 2, 3]);
        assert!(body.encode(BodyFormat::Plain).unwrap().is_none());

        let body = RequestBody::from("text");
        assert!(body.encode(BodyFormat::Binary).unwrap().is_none());
    }

    #[test]
    fn xml_requires_text() {
        let body = RequestBody::from(serde_json::json!({"x": 1}));
        assert!(body.encode(BodyFormat::Xml).is_err());

        let body = RequestBody::from("<x>1</x>");
        let encoded = body.encode(BodyFormat::Xml).unwrap().unwrap();
        assert_eq!(encoded.content_type, content_type::XML);
    }

    #[test]
    fn with_json_sets_format() {
        #[derive(Serialize)]
        struct Payload {
            name: String,
        }
        let req = RestRequest::post("items")
            .with_format(BodyFormat::Plain)
            .with_json(&Payload {
                name: "a".to_string(),
            })
            .unwrap();
        assert_eq!(req.body_format, BodyFormat::Json);
        assert_eq!(
            req.body,
            Some(RequestBody::Json(serde_json::json!({"name": "a"})))
        );
    }
}
