//! Session identifiers, termination modes and server API versions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Separator between the session name and user name in a session id
pub const SESSION_ID_SEPARATOR: &str = " - ";

/// Session id in its conventional `"<name> - <user>"` form.
///
/// The format is a naming convention, not something the server enforces,
/// so a name or user containing the separator cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId {
    pub name: String,
    pub user: String,
}

impl SessionId {
    pub fn new(name: impl Into<String>, user: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let user = user.into();
        if name.contains(SESSION_ID_SEPARATOR) || user.contains(SESSION_ID_SEPARATOR) {
            return Err(Error::InvalidSessionId(format!(
                "ambiguous session id: name \"{name}\" or user \"{user}\" contains \"{SESSION_ID_SEPARATOR}\""
            )));
        }
        Ok(Self { name, user })
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, SESSION_ID_SEPARATOR, self.user)
    }
}

impl FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(SESSION_ID_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(user), None) => Ok(Self {
                name: name.to_string(),
                user: user.to_string(),
            }),
            (_, Some(_), Some(_)) => Err(Error::InvalidSessionId(format!("ambiguous session id: {s}"))),
            _ => Err(Error::InvalidSessionId(format!(
                "expected \"<name>{SESSION_ID_SEPARATOR}<user>\": {s}"
            ))),
        }
    }
}

/// How to end a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndMode {
    /// Stop using the session locally; the server is not contacted
    Detach,
    /// Detach this controller but leave the test session running on the server
    Leave,
    /// Terminate the test session and wait until the server drops it
    Terminate,
    /// Forcefully terminate the test session
    Kill,
}

impl EndMode {
    /// Query token sent on `DELETE sessions/{id}`
    pub fn query_token(&self) -> Option<&'static str> {
        match self {
            EndMode::Leave => Some("false"),
            EndMode::Kill => Some("kill"),
            EndMode::Detach | EndMode::Terminate => None,
        }
    }
}

impl fmt::Display for EndMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndMode::Detach => write!(f, "detach"),
            EndMode::Leave => write!(f, "leave"),
            EndMode::Terminate => write!(f, "terminate"),
            EndMode::Kill => write!(f, "kill"),
        }
    }
}

impl FromStr for EndMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "detach" | "none" => Ok(EndMode::Detach),
            "leave" | "false" => Ok(EndMode::Leave),
            "terminate" | "true" => Ok(EndMode::Terminate),
            "kill" => Ok(EndMode::Kill),
            _ => Err(format!("Invalid end mode: {s}")),
        }
    }
}

/// What to do when the requested session already exists on the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingSession {
    /// Kill the existing session and create a new one
    Kill,
    /// Attach to the existing session
    Join,
    /// Report an error
    #[default]
    Fail,
}

impl FromStr for ExistingSession {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kill" => Ok(ExistingSession::Kill),
            "join" => Ok(ExistingSession::Join),
            "fail" | "" => Ok(ExistingSession::Fail),
            _ => Err(format!("Invalid existing-session policy: {s}")),
        }
    }
}

/// `stcapi_version` reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ApiVersion(pub u32, pub u32, pub u32);

impl ApiVersion {
    /// Oldest server that can detach a controller while keeping the test session
    pub const LEAVE_SESSION: ApiVersion = ApiVersion(2, 1, 5);
}

impl FromStr for ApiVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(Error::Protocol(format!("invalid stcapi_version: {s}")));
        }
        let num = |p: &str| {
            p.parse::<u32>()
                .map_err(|_| Error::Protocol(format!("invalid stcapi_version: {s}")))
        };
        Ok(ApiVersion(num(parts[0])?, num(parts[1])?, num(parts[2])?))
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0, self.1, self.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_display_and_parse() {
        let sid = SessionId::new("mytest", "bob").unwrap();
        assert_eq!(sid.to_string(), "mytest - bob");
        assert_eq!("mytest - bob".parse::<SessionId>().unwrap(), sid);
    }

    #[test]
    fn test_session_id_ambiguous() {
        assert!(SessionId::new("a - b", "bob").is_err());
        assert!(SessionId::new("test", "x - y").is_err());
        assert!("a - b - c".parse::<SessionId>().is_err());
        assert!("nosep".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_end_mode_tokens() {
        assert_eq!(EndMode::Leave.query_token(), Some("false"));
        assert_eq!(EndMode::Kill.query_token(), Some("kill"));
        assert_eq!(EndMode::Terminate.query_token(), None);
        assert_eq!(EndMode::Detach.query_token(), None);
    }

    #[test]
    fn test_end_mode_from_str() {
        assert_eq!("KILL".parse::<EndMode>().unwrap(), EndMode::Kill);
        assert_eq!("true".parse::<EndMode>().unwrap(), EndMode::Terminate);
        assert_eq!("none".parse::<EndMode>().unwrap(), EndMode::Detach);
        assert!("maybe".parse::<EndMode>().is_err());
    }

    #[test]
    fn test_api_version_ordering() {
        let v: ApiVersion = "2.1.4".parse().unwrap();
        assert!(v < ApiVersion::LEAVE_SESSION);
        let v: ApiVersion = "2.10.0".parse().unwrap();
        assert!(v > ApiVersion::LEAVE_SESSION);
        assert!("2.1".parse::<ApiVersion>().is_err());
        assert!("2.x.1".parse::<ApiVersion>().is_err());
    }

    #[test]
    fn test_existing_session_from_str() {
        assert_eq!("Join".parse::<ExistingSession>().unwrap(), ExistingSession::Join);
        assert!("other".parse::<ExistingSession>().is_err());
    }
}
