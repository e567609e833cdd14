//! stc-core: Core library for the Spirent TestCenter REST client
//!
//! This crate provides the protocol layer of the client:
//! - Server addressing and URL construction
//! - Request/response transaction decoding and the `Transport` seam
//! - The session lifecycle (create, join, end) and termination polling
//! - Object operations, chassis connections and file transfers
//!
//! It does not depend on any HTTP stack; `stc-http` supplies the reqwest
//! transport.

pub mod address;
pub mod config;
pub mod error;
pub mod manager;
pub mod multipart;
pub mod poll;
pub mod session;
pub mod transport;
pub mod value;

pub use address::{Endpoint, Query};
pub use config::{ClientConfig, ConfigManager};
pub use error::{ApiError, Error, Result};
pub use manager::{Attributes, CreateOutcome, SessionManager};
pub use multipart::MultipartForm;
pub use poll::{PollBuilder, PollConfig, Sleeper, TokioSleeper, poll_until};
pub use session::{ApiVersion, EndMode, ExistingSession, SessionId};
pub use transport::{
    Body, Payload, RawResponse, Request, Response, Transport, decode_response, is_error_status,
};
pub use value::{Params, Value};
