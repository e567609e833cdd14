//! In-memory transport for session manager tests

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;

use super::SessionManager;
use crate::address::Endpoint;
use crate::error::{ApiError, Error, Result, UNKNOWN_CODE};
use crate::transport::{Payload, Request, Response, Transport};

type Handler = Box<dyn Fn(&Request) -> Result<Response> + Send + Sync>;

/// Transport that answers from a closure and records every request
pub(crate) struct FakeTransport {
    handler: Handler,
    requests: Mutex<Vec<Request>>,
}

impl FakeTransport {
    pub(crate) fn new<F>(handler: F) -> Self
    where
        F: Fn(&Request) -> Result<Response> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of recorded requests with this method whose URL contains `fragment`
    pub(crate) fn count(&self, method: Method, fragment: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.url.contains(fragment))
            .count()
    }

    fn record(&self, request: &Request) {
        self.requests.lock().unwrap().push(request.clone());
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        self.record(&request);
        (self.handler)(&request)
    }

    async fn download(&self, request: Request, dest: &Path) -> Result<u64> {
        self.record(&request);
        let response = (self.handler)(&request)?;
        let data = match response.payload {
            Payload::Empty => Bytes::new(),
            Payload::Raw(b) => b,
            Payload::Json(v) => Bytes::from(v.to_string()),
        };
        tokio::fs::write(dest, &data).await?;
        Ok(data.len() as u64)
    }
}

pub(crate) const BASE: &str = "http://host/stcapi";

pub(crate) fn manager(transport: FakeTransport) -> SessionManager<FakeTransport> {
    SessionManager::new(transport, Endpoint::parse(BASE).unwrap())
}

pub(crate) fn json(status: u16, value: serde_json::Value) -> Result<Response> {
    Ok(Response {
        status,
        payload: Payload::Json(value),
    })
}

pub(crate) fn no_content() -> Result<Response> {
    Ok(Response {
        status: 204,
        payload: Payload::Empty,
    })
}

pub(crate) fn raw(data: &'static [u8]) -> Result<Response> {
    Ok(Response {
        status: 200,
        payload: Payload::Raw(Bytes::from_static(data)),
    })
}

pub(crate) fn api_error(status: u16, detail: &str) -> Result<Response> {
    Err(Error::Api(ApiError::new(status, UNKNOWN_CODE, detail)))
}

/// Decoded form body of a request, as ordered pairs
pub(crate) fn form(request: &Request) -> Vec<(String, String)> {
    match request.body.encode() {
        Some((_, data)) => url::form_urlencoded::parse(&data).into_owned().collect(),
        None => Vec::new(),
    }
}

pub(crate) fn form_value(request: &Request, key: &str) -> Option<String> {
    form(request).into_iter().find(|(k, _)| k == key).map(|(_, v)| v)
}
