//! Client configuration
//!
//! Values are resolved in order: explicit settings, environment variables,
//! the TOML config file, built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::{DEFAULT_BASE_PATH, Endpoint};
use crate::error::{Error, Result};
use crate::poll::PollConfig;
use crate::session::{EndMode, ExistingSession};

/// Port tried first when none is configured
pub const DEFAULT_PORT: u16 = 80;

/// Port tried when the default port does not answer
pub const FALLBACK_PORT: u16 = 8888;

pub const ENV_SERVER_ADDRESS: &str = "STC_SERVER_ADDRESS";
pub const ENV_SERVER_PORT: &str = "STC_SERVER_PORT";
pub const ENV_SESSION_NAME: &str = "STC_SESSION_NAME";
pub const ENV_EXISTING_SESSION: &str = "EXISTING_SESSION";
pub const ENV_TERMINATE_ON_DISCONNECT: &str = "STC_SESSION_TERMINATE_ON_DISCONNECT";
pub const ENV_SYNC_FILES_ON_COMPLETE: &str = "STC_SESSION_SYNCFILES_ON_SEQ_COMPLETE";
pub const ENV_CONFIG_DIR: &str = "STCREST_CONFIG_DIR";

/// Placeholder session name meaning "let the server pick one"
const NEW_SESSION_PLACEHOLDER: &str = "__NEW_TEST_SESSION__";

/// Poll settings for the session termination check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub interval_ms: u64,
    pub attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        let poll = PollConfig::default();
        Self {
            interval_ms: poll.interval.as_millis() as u64,
            attempts: poll.max_attempts,
        }
    }
}

impl From<PollSettings> for PollConfig {
    fn from(s: PollSettings) -> Self {
        PollConfig {
            interval: Duration::from_millis(s.interval_ms),
            max_attempts: s.attempts,
        }
    }
}

/// Connection and session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address (host name or IP)
    pub server: Option<String>,
    /// Explicit port; when unset the default and fallback ports are tried
    pub port: Option<u16>,
    pub scheme: String,
    pub base_path: String,
    /// Value of the `X-Spirent-API-Version` header
    pub api_version: u32,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Seconds to wait for a response; unset or 0 means no timeout
    pub timeout_secs: Option<u64>,
    pub session_name: Option<String>,
    pub existing_session: ExistingSession,
    /// Terminate the test session on close instead of leaving it running
    pub terminate_on_disconnect: bool,
    /// Download session files when the sequencer completes
    pub sync_files_on_complete: bool,
    pub poll: PollSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: None,
            port: None,
            scheme: "http".to_string(),
            base_path: DEFAULT_BASE_PATH.to_string(),
            api_version: 1,
            user: None,
            password: None,
            timeout_secs: None,
            session_name: None,
            existing_session: ExistingSession::Fail,
            terminate_on_disconnect: false,
            sync_files_on_complete: false,
            poll: PollSettings::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: Some(server.into()),
            ..Default::default()
        }
    }

    /// Overlay values from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(server) = get(ENV_SERVER_ADDRESS) {
            self.server = Some(server);
        }
        if let Some(port) = get(ENV_SERVER_PORT) {
            self.port = Some(parse_port(&port)?);
        }
        if let Some(name) = get(ENV_SESSION_NAME) {
            self.session_name = if name == NEW_SESSION_PLACEHOLDER {
                None
            } else {
                Some(name)
            };
        }
        if let Some(policy) = get(ENV_EXISTING_SESSION) {
            self.existing_session = policy.parse().unwrap_or_else(|e| {
                tracing::warn!("{e}; existing sessions will be reported as errors");
                ExistingSession::Fail
            });
        }
        if let Some(v) = get(ENV_TERMINATE_ON_DISCONNECT) {
            self.terminate_on_disconnect = is_true(&v);
        }
        if let Some(v) = get(ENV_SYNC_FILES_ON_COMPLETE) {
            self.sync_files_on_complete = v.trim() == "1";
        }
        Ok(())
    }

    /// Configured server address
    pub fn server(&self) -> Result<&str> {
        self.server
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("{ENV_SERVER_ADDRESS} not set")))
    }

    /// Ports to try, in order
    pub fn candidate_ports(&self) -> Vec<u16> {
        match self.port {
            Some(p) => vec![p],
            None => vec![DEFAULT_PORT, FALLBACK_PORT],
        }
    }

    pub fn endpoint(&self, port: u16) -> Result<Endpoint> {
        Endpoint::new(&self.scheme, self.server()?, port, &self.base_path)
    }

    /// Session name to request: `explicit` when given, else the configured
    /// one. The `__NEW_TEST_SESSION__` placeholder means none.
    pub fn session_name_for(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .or(self.session_name.as_deref())
            .filter(|n| *n != NEW_SESSION_PLACEHOLDER)
            .map(str::to_string)
    }

    /// How closing the client ends its active session
    pub fn close_mode(&self) -> EndMode {
        if self.terminate_on_disconnect {
            EndMode::Terminate
        } else {
            EndMode::Leave
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        self.server()?;
        if self.port == Some(0) {
            return Err(Error::Config("invalid port value".to_string()));
        }
        if self.scheme != "http" && self.scheme != "https" {
            return Err(Error::Config(format!("unsupported scheme: {}", self.scheme)));
        }
        if self.poll.attempts == 0 {
            return Err(Error::Config("poll attempts must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn is_true(s: &str) -> bool {
    matches!(s.trim(), "1" | "true" | "True" | "TRUE")
}

fn parse_port(s: &str) -> Result<u16> {
    match s.trim().parse::<u16>() {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(Error::Config(format!("invalid port value: {s}"))),
    }
}

/// Loads and saves the TOML config file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    /// Use `$STCREST_CONFIG_DIR/config.toml`, else `<config dir>/stcrest/config.toml`
    pub fn new() -> Result<Self> {
        let dir = match std::env::var_os(ENV_CONFIG_DIR) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| Error::Config("cannot determine config directory".to_string()))?
                .join("stcrest"),
        };
        Ok(Self::with_path(dir.join("config.toml")))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file, or defaults when it does not exist
    pub fn load(&self) -> Result<ClientConfig> {
        if !self.path.exists() {
            return Ok(ClientConfig::default());
        }
        let text = std::fs::read_to_string(&self.path)?;
        toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", self.path.display())))
    }

    pub fn save(&self, config: &ClientConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(config).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.candidate_ports(), vec![DEFAULT_PORT, FALLBACK_PORT]);
        assert_eq!(config.api_version, 1);
        assert!(config.timeout().is_none());
        assert!(matches!(config.server(), Err(Error::Config(_))));
    }

    #[test]
    fn test_env_overlay() {
        let mut config = ClientConfig::default();
        config
            .apply_env_from(env(&[
                (ENV_SERVER_ADDRESS, "10.1.1.1"),
                (ENV_SERVER_PORT, "8888"),
                (ENV_SESSION_NAME, "__NEW_TEST_SESSION__"),
                (ENV_EXISTING_SESSION, "join"),
            ]))
            .unwrap();
        assert_eq!(config.server().unwrap(), "10.1.1.1");
        assert_eq!(config.candidate_ports(), vec![8888]);
        assert!(config.session_name.is_none());
        assert_eq!(config.existing_session, ExistingSession::Join);
    }

    #[test]
    fn test_env_invalid_port() {
        let mut config = ClientConfig::default();
        assert!(config.apply_env_from(env(&[(ENV_SERVER_PORT, "0")])).is_err());
        assert!(config.apply_env_from(env(&[(ENV_SERVER_PORT, "70000")])).is_err());
    }

    #[test]
    fn test_endpoint_from_config() {
        let config = ClientConfig::new("stc.example.com");
        let ep = config.endpoint(80).unwrap();
        assert_eq!(ep.base_url(), "http://stc.example.com:80/stcapi");
    }

    #[test]
    fn test_timeout_zero_means_none() {
        let config = ClientConfig {
            timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(config.timeout().is_none());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("sub/config.toml"));
        assert_eq!(manager.load().unwrap(), ClientConfig::default());

        let config = ClientConfig {
            port: Some(8888),
            timeout_secs: Some(30),
            ..ClientConfig::new("10.2.2.2")
        };
        manager.save(&config).unwrap();
        assert_eq!(manager.load().unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server = \"lab1\"\n[poll]\nattempts = 5\n").unwrap();
        let config = ConfigManager::with_path(&path).load().unwrap();
        assert_eq!(config.server().unwrap(), "lab1");
        assert_eq!(config.poll.attempts, 5);
        assert_eq!(config.poll.interval_ms, 5000);
        assert_eq!(config.base_path, "stcapi");
    }

    #[test]
    fn test_validate() {
        assert!(ClientConfig::new("a").validate().is_ok());
        let bad = ClientConfig {
            scheme: "ftp".into(),
            ..ClientConfig::new("a")
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_poll_attempts() {
        let config = ClientConfig {
            poll: PollSettings {
                interval_ms: 10,
                attempts: 0,
            },
            ..ClientConfig::new("a")
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("poll attempts"));
    }

    #[test]
    fn test_session_flags_from_env() {
        let mut config = ClientConfig::default();
        assert_eq!(config.close_mode(), EndMode::Leave);

        config
            .apply_env_from(env(&[
                (ENV_TERMINATE_ON_DISCONNECT, "true"),
                (ENV_SYNC_FILES_ON_COMPLETE, "1"),
            ]))
            .unwrap();
        assert!(config.terminate_on_disconnect);
        assert!(config.sync_files_on_complete);
        assert_eq!(config.close_mode(), EndMode::Terminate);

        config
            .apply_env_from(env(&[
                (ENV_TERMINATE_ON_DISCONNECT, "no"),
                (ENV_SYNC_FILES_ON_COMPLETE, "true"),
            ]))
            .unwrap();
        assert!(!config.terminate_on_disconnect);
        assert!(!config.sync_files_on_complete);
    }

    #[test]
    fn test_session_name_for_placeholder() {
        let config = ClientConfig {
            session_name: Some("lab".into()),
            ..Default::default()
        };
        assert_eq!(config.session_name_for(None).as_deref(), Some("lab"));
        assert_eq!(config.session_name_for(Some("other")).as_deref(), Some("other"));
        assert_eq!(config.session_name_for(Some(NEW_SESSION_PLACEHOLDER)), None);
    }
}
