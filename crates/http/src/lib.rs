//! stc-http: reqwest transport for the STC REST client
//!
//! Implements the `Transport` trait from stc-core over a reqwest client.
//! Each call is one HTTP round trip on a fresh connection. Redirects are
//! returned to the caller as errors, never followed.

use std::error::Error as StdError;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use stc_core::transport::CONTENT_TYPE_OCTET_STREAM;
use stc_core::{
    Body, ClientConfig, Error, RawResponse, Request, Response, Result, SessionManager, Transport,
    decode_response, is_error_status,
};
use tokio::io::AsyncWriteExt;

/// Session manager over HTTP
pub type StcHttp = SessionManager<HttpTransport>;

/// Connect to the server named by `config`, trying candidate ports in order
pub async fn connect(config: &ClientConfig) -> Result<StcHttp> {
    let timeout = config.timeout();
    SessionManager::connect(config, |_| HttpTransport::new(timeout)).await
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport; `timeout` bounds each whole request
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn execute(&self, request: Request) -> Result<reqwest::Response> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        match request.body {
            Body::File { path, .. } => {
                let file = tokio::fs::File::open(&path).await?;
                builder = builder
                    .header(CONTENT_TYPE, CONTENT_TYPE_OCTET_STREAM)
                    .body(reqwest::Body::from(file));
            }
            body => {
                if let Some((content_type, data)) = body.encode() {
                    builder = builder.header(CONTENT_TYPE, content_type).body(data);
                }
            }
        }
        builder.send().await.map_err(connection_error)
    }

    async fn read_raw(response: reqwest::Response) -> Result<RawResponse> {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(connection_error)?;
        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let response = self.execute(request).await?;
        decode_response(Self::read_raw(response).await?)
    }

    async fn download(&self, request: Request, dest: &Path) -> Result<u64> {
        let mut response = self.execute(request).await?;
        let status = response.status().as_u16();
        if is_error_status(status) {
            decode_response(Self::read_raw(response).await?)?;
            return Err(Error::Protocol(format!("download failed with status {status}")));
        }

        let file = tokio::fs::File::create(dest).await?;
        let mut writer = tokio::io::BufWriter::new(file);
        let mut total = 0u64;
        let result: Result<()> = async {
            while let Some(chunk) = response.chunk().await.map_err(connection_error)? {
                writer.write_all(&chunk).await?;
                total += chunk.len() as u64;
            }
            writer.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            drop(writer);
            if let Err(rm) = tokio::fs::remove_file(dest).await {
                tracing::warn!(path = %dest.display(), error = %rm, "failed to remove partial download");
            }
            return Err(e);
        }
        tracing::debug!(path = %dest.display(), bytes = total, "download complete");
        Ok(total)
    }
}

/// Map a reqwest failure to `Error::Connection`, keeping the OS error code
fn connection_error(e: reqwest::Error) -> Error {
    if e.is_builder() {
        return Error::InvalidArgument(e.to_string());
    }
    let mut code = -1;
    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>()
            && let Some(os) = io.raw_os_error()
        {
            code = os;
            break;
        }
        source = err.source();
    }
    Error::Connection {
        code,
        message: e.to_string(),
    }
}
