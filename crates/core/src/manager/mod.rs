//! Session manager
//!
//! `SessionManager` owns the server endpoint, the per-request header map and
//! the active session id. Every object operation and file transfer goes
//! through it, so it is the only component with state that spans calls.

mod files;
mod lifecycle;
mod objects;

#[cfg(test)]
pub(crate) mod testing;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use http::header::{ACCEPT, AUTHORIZATION, HeaderName, HeaderValue};
use http::{HeaderMap, Method};

use crate::address::{Endpoint, Query};
use crate::config::{ClientConfig, DEFAULT_PORT};
use crate::error::{Error, Result};
use crate::poll::{PollConfig, Sleeper, TokioSleeper};
use crate::session::{ApiVersion, EndMode};
use crate::transport::{Body, CONTENT_TYPE_JSON, Request, Response, Transport};
use crate::value::Params;

pub use lifecycle::CreateOutcome;
pub use objects::Attributes;

/// Header carrying the active session id
pub const SESSION_HEADER: HeaderName = HeaderName::from_static("x-stc-api-session");

/// Header carrying the requested automation API version
pub const API_VERSION_HEADER: HeaderName = HeaderName::from_static("x-spirent-api-version");

/// Client for one STC REST server, holding at most one active session
pub struct SessionManager<T: Transport> {
    transport: T,
    endpoint: Endpoint,
    headers: HeaderMap,
    session_id: Option<String>,
    api_version: Option<ApiVersion>,
    sleeper: Arc<dyn Sleeper>,
    poll: PollConfig,
    close_mode: EndMode,
    sync_dir: Option<PathBuf>,
}

impl<T: Transport> SessionManager<T> {
    /// Create a manager without probing the server
    pub fn new(transport: T, endpoint: Endpoint) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(CONTENT_TYPE_JSON));
        Self {
            transport,
            endpoint,
            headers,
            session_id: None,
            api_version: None,
            sleeper: Arc::new(TokioSleeper),
            poll: PollConfig::default(),
            close_mode: EndMode::Leave,
            sync_dir: None,
        }
    }

    /// Connect to the configured server.
    ///
    /// Sends `GET sessions` to each candidate port in order and keeps the
    /// first that answers. Fails with `CannotConnect` naming the last port
    /// tried when none does.
    pub async fn connect<F>(config: &ClientConfig, make_transport: F) -> Result<Self>
    where
        F: Fn(&Endpoint) -> Result<T>,
    {
        config.validate()?;
        let server = config.server()?.to_string();
        let mut last_port = DEFAULT_PORT;

        for port in config.candidate_ports() {
            last_port = port;
            let endpoint = config.endpoint(port)?;
            let transport = make_transport(&endpoint)?;
            let mut manager = SessionManager::new(transport, endpoint)
                .with_poll(config.poll.into())
                .with_close_mode(config.close_mode())
                .with_file_sync(config.sync_files_on_complete.then(|| PathBuf::from(".")));
            if let (Some(user), Some(password)) = (&config.user, &config.password) {
                manager = manager.with_basic_auth(user, password)?;
            }

            match manager.ping().await {
                Ok(()) => {
                    manager.set_header(API_VERSION_HEADER, &config.api_version.to_string())?;
                    tracing::info!(server = %server, port, "connected to STC server");
                    return Ok(manager);
                }
                Err(e) => {
                    tracing::debug!(server = %server, port, error = %e, "server did not answer");
                }
            }
        }

        Err(Error::CannotConnect {
            server,
            port: last_port,
        })
    }

    pub fn with_basic_auth(mut self, user: &str, password: &str) -> Result<Self> {
        let token = BASE64.encode(format!("{user}:{password}"));
        self.set_header(AUTHORIZATION, &format!("Basic {token}"))?;
        Ok(self)
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// How `close` ends the active session
    pub fn with_close_mode(mut self, mode: EndMode) -> Self {
        self.close_mode = mode;
        self
    }

    /// Download every session file into `dir` once the sequencer completes
    pub fn with_file_sync(mut self, dir: Option<PathBuf>) -> Self {
        self.sync_dir = dir;
        self
    }

    pub fn close_mode(&self) -> EndMode {
        self.close_mode
    }

    pub fn sync_dir(&self) -> Option<&Path> {
        self.sync_dir.as_deref()
    }

    /// Lightweight liveness check that needs no session
    pub async fn ping(&self) -> Result<()> {
        self.get_request("sessions", None, None).await.map(|_| ())
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Get the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Headers sent with every request
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn started(&self) -> bool {
        self.session_id.is_some()
    }

    /// Build a URL under this server's base path
    pub fn make_url(&self, container: &str, resource: Option<&str>) -> String {
        self.endpoint.make_url(Some(container), resource, None)
    }

    pub(crate) fn check_session(&self) -> Result<()> {
        if self.started() {
            Ok(())
        } else {
            Err(Error::NotStarted)
        }
    }

    fn set_header(&mut self, name: HeaderName, value: &str) -> Result<()> {
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::InvalidArgument(format!("invalid value for header {name}: {value}")))?;
        self.headers.insert(name, value);
        Ok(())
    }

    fn request_headers(&self, accept: Option<&str>) -> Result<HeaderMap> {
        let mut headers = self.headers.clone();
        if let Some(accept) = accept {
            let value = HeaderValue::from_str(accept)
                .map_err(|_| Error::InvalidArgument(format!("invalid Accept value: {accept}")))?;
            headers.insert(ACCEPT, value);
        }
        Ok(headers)
    }

    pub(crate) fn build_request(
        &self,
        method: Method,
        container: Option<&str>,
        resource: Option<&str>,
        query: Option<&Query>,
        accept: Option<&str>,
    ) -> Result<Request> {
        let url = self.endpoint.make_url(container, resource, query);
        Ok(Request::new(method, url, self.request_headers(accept)?))
    }

    pub(crate) async fn transact(&self, request: Request) -> Result<Response> {
        tracing::debug!(method = %request.method, url = %request.url, "request");
        let response = self.transport.send(request).await;
        match &response {
            Ok(r) => tracing::debug!(status = r.status, "response"),
            Err(e) => tracing::debug!(error = %e, "request failed"),
        }
        response
    }

    pub(crate) async fn get_request(
        &self,
        container: &str,
        resource: Option<&str>,
        query: Option<&Query>,
    ) -> Result<Response> {
        let request = self.build_request(Method::GET, Some(container), resource, query, None)?;
        self.transact(request).await
    }

    pub(crate) async fn post_request(
        &self,
        container: &str,
        resource: Option<&str>,
        params: Params,
    ) -> Result<Response> {
        let request = self
            .build_request(Method::POST, Some(container), resource, None, None)?
            .body(Body::Form(params));
        self.transact(request).await
    }

    pub(crate) async fn put_request(
        &self,
        container: Option<&str>,
        resource: Option<&str>,
        params: Params,
    ) -> Result<Response> {
        let request = self
            .build_request(Method::PUT, container, resource, None, None)?
            .body(Body::Form(params));
        self.transact(request).await
    }

    pub(crate) async fn delete_request(
        &self,
        container: &str,
        resource: Option<&str>,
        query: Option<&Query>,
    ) -> Result<Response> {
        let request = self.build_request(Method::DELETE, Some(container), resource, query, None)?;
        self.transact(request).await
    }
}
