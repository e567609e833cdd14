//! Process exit codes
//!
//! Scripts branch on these, so the numeric values are stable.

use stc_core::Error;

/// Exit status of the `stcrest` binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    /// Bad arguments or configuration
    UsageError = 2,
    /// Server could not be reached
    NetworkError = 3,
    NotFound = 4,
    /// Server rejected the request
    ApiError = 5,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Classify a client error
    pub fn from_error(error: &Error) -> Self {
        if error.is_connection() {
            return ExitCode::NetworkError;
        }
        if error.is_not_found() {
            return ExitCode::NotFound;
        }
        match error {
            Error::InvalidArgument(_) | Error::InvalidSessionId(_) | Error::Config(_) => {
                ExitCode::UsageError
            }
            Error::FileNotFound(_) => ExitCode::NotFound,
            e if e.api().is_some() => ExitCode::ApiError,
            _ => ExitCode::GeneralError,
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.as_i32() as u8)
    }
}
