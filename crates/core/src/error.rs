//! Error types for stc-core
//!
//! Transport failures, server rejections and local misuse are kept apart so
//! callers can tell "could not reach server" from "server rejected request".

use thiserror::Error;

/// Result type alias for stc-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Application error code used when the server supplies none
pub const UNKNOWN_CODE: i64 = -1;

/// Error reported by the server for any response with status >= 300
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status of the response
    pub status: u16,
    /// Application-level error code, `UNKNOWN_CODE` when absent
    pub code: i64,
    /// Human-readable detail from the `detail` or `message` field
    pub detail: String,
}

impl ApiError {
    pub fn new(status: u16, code: i64, detail: impl Into<String>) -> Self {
        Self {
            status,
            code,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.detail)
    }
}

impl std::error::Error for ApiError {}

/// Error types for STC REST operations
#[derive(Error, Debug)]
pub enum Error {
    /// Server could not be reached (DNS, refused connect, TLS failure, timeout)
    #[error("connection error [{code}]: {message}")]
    Connection { code: i32, message: String },

    /// Server responded with status >= 300
    #[error("{0}")]
    Api(#[from] ApiError),

    /// No candidate port answered the liveness check
    #[error("Cannot connect to STC server: {server}:{port}")]
    CannotConnect { server: String, port: u16 },

    /// Operation needs an active session
    #[error("must first join session")]
    NotStarted,

    /// A session is already bound to this manager
    #[error("session {0} is already active; end it first")]
    SessionActive(String),

    /// Server refused to create a session because one with this id exists
    #[error("failed to create session: session \"{session_id}\" already exists")]
    SessionExists { session_id: String },

    #[error("failed to create session: {0}")]
    CreateFailed(Box<Error>),

    #[error("failed to join session \"{session_id}\": {source}")]
    JoinFailed {
        session_id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to end session: {0}")]
    EndFailed(Box<Error>),

    /// Session was still listed after the bounded termination poll
    #[error("test session has not stopped: {0}")]
    SessionNotStopped(String),

    /// Requested operation is not available on the connected server
    #[error("option not available on server: {0}")]
    Unsupported(String),

    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A wait did not finish in the allotted time
    #[error("{0}")]
    Timeout(String),

    /// Response did not have the expected shape
    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("{0} is not a directory")]
    NotADirectory(String),

    #[error("failed to download \"{name}\": {source}")]
    DownloadFailed {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the server could not be reached at all
    pub fn is_connection(&self) -> bool {
        match self {
            Error::Connection { .. } | Error::CannotConnect { .. } => true,
            Error::CreateFailed(e) | Error::EndFailed(e) => e.is_connection(),
            Error::JoinFailed { source, .. } | Error::DownloadFailed { source, .. } => {
                source.is_connection()
            }
            _ => false,
        }
    }

    /// Underlying API error, looking through operation context wrappers
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Error::Api(e) => Some(e),
            Error::CreateFailed(e) | Error::EndFailed(e) => e.api(),
            Error::JoinFailed { source, .. } | Error::DownloadFailed { source, .. } => source.api(),
            _ => None,
        }
    }

    /// HTTP status of the underlying API error, if any
    pub fn status(&self) -> Option<u16> {
        self.api().map(|e| e.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
