//! Transport seam and response decoding
//!
//! A `Transport` performs exactly one HTTP round trip per call. It never
//! retries; only the session manager re-issues requests, and only for the
//! kill-then-recreate and termination-poll sequences.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};

use crate::error::{ApiError, Error, Result, UNKNOWN_CODE};
use crate::value::Params;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// Request body
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    /// Key/value parameters, sent form-url-encoded
    Form(Params),
    /// Raw bytes with an explicit content type
    Bytes { content_type: String, data: Bytes },
    /// Local file streamed as `application/octet-stream`
    File { path: PathBuf, len: u64 },
}

impl Body {
    /// Content type and encoded bytes, `None` when nothing is sent in memory.
    /// Empty form parameters send no body at all; `File` bodies are streamed
    /// by the transport.
    pub fn encode(&self) -> Option<(String, Bytes)> {
        match self {
            Body::Empty | Body::File { .. } => None,
            Body::Form(p) if p.is_empty() => None,
            Body::Form(p) => Some((CONTENT_TYPE_FORM.to_string(), Bytes::from(p.to_form()))),
            Body::Bytes { content_type, data } => Some((content_type.clone(), data.clone())),
        }
    }
}

/// One HTTP request
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Body,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            method,
            url: url.into(),
            headers,
            body: Body::Empty,
        }
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }
}

/// Undecoded response as received from the wire
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// 204, or an empty JSON body
    Empty,
    Json(serde_json::Value),
    Raw(Bytes),
}

impl Payload {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(v) => Some(v),
            _ => None,
        }
    }

    /// JSON body, or a protocol error naming what was expected
    pub fn into_json(self) -> Result<serde_json::Value> {
        match self {
            Payload::Json(v) => Ok(v),
            Payload::Empty => Err(Error::Protocol("empty response body".to_string())),
            Payload::Raw(b) => Err(Error::Protocol(format!(
                "expected JSON, got {} bytes of non-JSON content",
                b.len()
            ))),
        }
    }

    /// Python-style truthiness: absent, empty or null bodies carry no error info
    fn is_blank(&self) -> bool {
        match self {
            Payload::Empty => true,
            Payload::Raw(b) => b.is_empty(),
            Payload::Json(v) => match v {
                serde_json::Value::Null => true,
                serde_json::Value::Object(m) => m.is_empty(),
                serde_json::Value::Array(a) => a.is_empty(),
                serde_json::Value::String(s) => s.is_empty(),
                _ => false,
            },
        }
    }
}

/// Decoded response
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub payload: Payload,
}

impl Response {
    pub fn into_json(self) -> Result<serde_json::Value> {
        self.payload.into_json()
    }
}

/// Statuses that carry an error body: 207 Multi-Status and anything >= 300
pub fn is_error_status(status: u16) -> bool {
    status >= 300 || status == 207
}

/// Decode a raw response and turn any error status into an `ApiError`.
///
/// 204 always yields `Payload::Empty` whatever the content type says.
/// Malformed JSON is replaced by `{"code": -1, "detail": <raw>}` so the
/// caller still sees a structured error rather than a parse failure.
pub fn decode_response(raw: RawResponse) -> Result<Response> {
    let status = raw.status;
    let payload = if status == 204 {
        Payload::Empty
    } else if raw
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with(CONTENT_TYPE_JSON))
    {
        if raw.body.is_empty() {
            Payload::Empty
        } else {
            match serde_json::from_slice(&raw.body) {
                Ok(v) => Payload::Json(v),
                Err(e) => {
                    tracing::debug!(error = %e, "malformed JSON response body");
                    Payload::Json(serde_json::json!({
                        "code": UNKNOWN_CODE,
                        "detail": String::from_utf8_lossy(&raw.body),
                    }))
                }
            }
        }
    } else {
        Payload::Raw(raw.body)
    };

    if is_error_status(status) {
        return Err(Error::Api(api_error(status, &payload)));
    }
    Ok(Response { status, payload })
}

/// Build the `ApiError` for a failed response from whatever the body holds
pub fn api_error(status: u16, payload: &Payload) -> ApiError {
    if payload.is_blank() {
        return ApiError::new(status, UNKNOWN_CODE, "");
    }
    match payload {
        Payload::Json(serde_json::Value::Object(obj)) => {
            let code = obj.get("code").and_then(code_from_json).unwrap_or(UNKNOWN_CODE);
            let detail = obj
                .get("detail")
                .or_else(|| obj.get("message"))
                .map(text_from_json)
                .unwrap_or_else(|| format!("unknown error: {}", serde_json::Value::Object(obj.clone())));
            ApiError::new(status, code, detail)
        }
        Payload::Json(other) => ApiError::new(status, UNKNOWN_CODE, format!("unknown error: {other}")),
        Payload::Raw(b) => ApiError::new(
            status,
            UNKNOWN_CODE,
            format!("unknown error: {}", String::from_utf8_lossy(b)),
        ),
        Payload::Empty => ApiError::new(status, UNKNOWN_CODE, ""),
    }
}

fn code_from_json(v: &serde_json::Value) -> Option<i64> {
    match v {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text_from_json(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One-round-trip HTTP transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and decode the response
    async fn send(&self, request: Request) -> Result<Response>;

    /// Send a request and stream the response body into `dest`.
    ///
    /// Returns the number of bytes written. Error responses are decoded the
    /// same way as `send` and nothing is written.
    async fn download(&self, request: Request, dest: &Path) -> Result<u64>;
}
