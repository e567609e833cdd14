//! Generic object operations, commands, chassis connections and help
//!
//! Each operation is a single request through the session manager; nothing
//! here keeps state.

use std::path::PathBuf;
use std::time::Duration;

use super::SessionManager;
use super::files::file_name_of;
use crate::address::Query;
use crate::error::{Error, Result};
use crate::transport::{Payload, Transport};
use crate::value::Params;

/// Parameter name reserved for the command in `perform`
pub const COMMAND_KEY: &str = "command";

/// Help subjects the server answers without a session
const SESSIONLESS_HELP: &[&str] = &[
    "commands",
    "create",
    "config",
    "get",
    "delete",
    "perform",
    "connect",
    "connectall",
    "disconnect",
    "disconnectall",
    "apply",
    "log",
    "help",
];

const LOG_LEVELS: &[&str] = &["INFO", "WARN", "ERROR", "FATAL"];

/// Sequencer poll interval for `wait_until_complete`
const SEQUENCER_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Parameter holding a local file that `perform_with_upload` sends first
fn upload_param(command: &str) -> Option<&'static str> {
    let lower = command.to_lowercase();
    match lower.strip_suffix("command").unwrap_or(&lower) {
        "loadfromdatabase" | "queryresult" => Some("databaseconnectionstring"),
        "loadfromxml"
        | "loadfilterfromlibrary"
        | "licensedownloadfile"
        | "downloadfile"
        | "manualscheduleloadfromtemplate" => Some("filename"),
        "pppuploadauthenticationfile" => Some("authenticationfilepath"),
        _ => None,
    }
}

/// Reply to `get`; its shape depends on how many attributes were requested
#[derive(Debug, Clone, PartialEq)]
pub enum Attributes {
    /// No attributes requested: the full object representation
    Object(serde_json::Map<String, serde_json::Value>),
    /// One attribute requested: its value as returned by the server
    Single(serde_json::Value),
    /// Several attributes requested: name to value
    Multiple(serde_json::Map<String, serde_json::Value>),
}

impl Attributes {
    /// Look up an attribute in an `Object` or `Multiple` reply
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        match self {
            Attributes::Object(m) | Attributes::Multiple(m) => m.get(name),
            Attributes::Single(_) => None,
        }
    }

    /// Text of a `Single` reply
    pub fn as_text(&self) -> Option<String> {
        match self {
            Attributes::Single(serde_json::Value::String(s)) => Some(s.clone()),
            Attributes::Single(v) => Some(v.to_string()),
            _ => None,
        }
    }

    /// Whitespace-separated tokens of a `Single` reply, e.g. a handle list
    pub fn tokens(&self) -> Vec<String> {
        match self {
            Attributes::Single(serde_json::Value::Array(items)) => {
                items.iter().map(json_text).collect()
            }
            _ => self
                .as_text()
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }
}

fn json_text(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn payload_json(payload: Payload) -> Result<serde_json::Value> {
    match payload {
        Payload::Empty => Ok(serde_json::Value::Null),
        p => p.into_json(),
    }
}

impl<T: Transport> SessionManager<T> {
    /// Read an object or some of its attributes
    pub async fn get(&self, handle: &str, attrs: &[&str]) -> Result<Attributes> {
        self.check_session()?;
        let query = Query::flags(attrs.iter().copied());
        let data = self
            .get_request("objects", Some(handle), Some(&query))
            .await?
            .into_json()?;

        match (attrs.len(), data) {
            (1, value) => Ok(Attributes::Single(value)),
            (0, serde_json::Value::Object(m)) => Ok(Attributes::Object(m)),
            (_, serde_json::Value::Object(m)) => Ok(Attributes::Multiple(m)),
            (_, other) => Err(Error::Protocol(format!(
                "expected an object for {handle}, got: {other}"
            ))),
        }
    }

    /// Text value of one attribute
    pub async fn get_attr(&self, handle: &str, attr: &str) -> Result<String> {
        self.get(handle, &[attr])
            .await?
            .as_text()
            .ok_or_else(|| Error::Protocol(format!("no value for {handle}.{attr}")))
    }

    /// Create an object and return its handle
    pub async fn create(&self, object_type: &str, under: Option<&str>, attrs: Params) -> Result<String> {
        let data = self.createx(object_type, under, attrs).await?;
        data.get("handle")
            .and_then(|h| h.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Protocol(format!("no handle in create response: {data}")))
    }

    /// Create an object and return the full creation record
    pub async fn createx(
        &self,
        object_type: &str,
        under: Option<&str>,
        attrs: Params,
    ) -> Result<serde_json::Value> {
        self.check_session()?;
        let mut params = Params::new().with("object_type", object_type);
        if let Some(under) = under.filter(|u| !u.is_empty()) {
            params.insert("under", under);
        }
        params.extend(attrs);

        let response = self.post_request("objects", None, params).await?;
        payload_json(response.payload)
    }

    pub async fn delete(&self, handle: &str) -> Result<()> {
        self.check_session()?;
        self.delete_request("objects", Some(handle), None).await?;
        Ok(())
    }

    /// Set or modify attributes. Nested maps describe child object updates
    /// and are passed through without interpretation.
    pub async fn config(&self, handle: &str, attrs: Params) -> Result<()> {
        self.check_session()?;
        self.put_request(Some("objects"), Some(handle), attrs).await?;
        Ok(())
    }

    /// Execute a command. `params` must not contain the reserved `command` key.
    pub async fn perform(&self, command: &str, params: Params) -> Result<serde_json::Value> {
        self.check_session()?;
        if let Some((key, _)) = params.find_ignore_case(COMMAND_KEY) {
            return Err(Error::InvalidArgument(format!(
                "parameter \"{key}\" collides with the reserved command key"
            )));
        }
        let mut params = params;
        params.insert(COMMAND_KEY, command);
        let response = self.post_request("perform", None, params).await?;
        payload_json(response.payload)
    }

    /// `perform`, uploading the command's file argument first.
    ///
    /// Commands that read a file on the server (`LoadFromXml`,
    /// `LoadFromDatabase`, `PppUploadAuthenticationFile` and a few others)
    /// get their local path uploaded, and the parameter is replaced by the
    /// name the server stored it under.
    pub async fn perform_with_upload(&self, command: &str, params: Params) -> Result<serde_json::Value> {
        self.check_session()?;
        let target = upload_param(command)
            .and_then(|arg| params.find_ignore_case(arg))
            .map(|(key, value)| (key.to_string(), value.as_str().map(PathBuf::from)));

        let mut params = params;
        if let Some((key, src)) = target {
            let src = src.ok_or_else(|| {
                Error::InvalidArgument(format!("parameter \"{key}\" must be a file path"))
            })?;
            let reply = self.upload(&src, None).await?;
            let name = match reply.as_ref().and_then(|r| r.get("name")).and_then(|n| n.as_str()) {
                Some(name) => name.to_string(),
                None => file_name_of(&src)?,
            };
            tracing::debug!(command, param = %key, name = %name, "replaced upload path");
            params.insert(key, name);
        }
        self.perform(command, params).await
    }

    /// Reserve ports by location, e.g. `//10.1.1.1/1/1`
    pub async fn reserve(&self, locations: &[&str]) -> Result<()> {
        self.port_command("reservePort", locations).await
    }

    pub async fn release(&self, locations: &[&str]) -> Result<()> {
        self.port_command("releasePort", locations).await
    }

    async fn port_command(&self, command: &str, locations: &[&str]) -> Result<()> {
        if locations.is_empty() {
            return Err(Error::InvalidArgument("no port locations given".to_string()));
        }
        let params = Params::new().with("Location", locations.join(" "));
        self.perform(command, params).await?;
        Ok(())
    }

    /// Subscribe to results and return the result data set handle
    pub async fn subscribe(&self, params: Params) -> Result<Option<String>> {
        let data = self.perform("ResultsSubscribe", params).await?;
        Ok(data.get("ReturnedResultDataSet").map(json_text))
    }

    pub async fn unsubscribe(&self, result_data_set: &str) -> Result<()> {
        let params = Params::new().with("ResultDataSet", result_data_set);
        self.perform("ResultDataSetUnsubscribe", params).await?;
        Ok(())
    }

    /// Send the test configuration to the chassis
    pub async fn apply(&self) -> Result<()> {
        self.check_session()?;
        self.put_request(None, Some("apply"), Params::new()).await?;
        Ok(())
    }

    /// BLL version of the active session, `None` when no session is active
    pub async fn bll_version(&self) -> Result<Option<String>> {
        if !self.started() {
            return Ok(None);
        }
        self.system_version().await.map(Some)
    }

    /// STC and API information
    pub async fn system_info(&self) -> Result<serde_json::Value> {
        self.get_request("system", None, None).await?.into_json()
    }

    pub async fn server_info(&self) -> Result<serde_json::Value> {
        self.get_request("objects", Some("system1"), None).await?.into_json()
    }

    pub async fn chassis(&self) -> Result<serde_json::Value> {
        self.check_session()?;
        self.get_request("chassis", None, None).await?.into_json()
    }

    pub async fn chassis_info(&self, chassis: &str) -> Result<serde_json::Value> {
        if chassis.trim().is_empty() {
            return Err(Error::InvalidArgument("missing chassis address".to_string()));
        }
        self.check_session()?;
        self.get_request("chassis", Some(chassis), None).await?.into_json()
    }

    pub async fn connections(&self) -> Result<serde_json::Value> {
        self.check_session()?;
        self.get_request("connections", None, None).await?.into_json()
    }

    /// Whether `chassis` is connected; an unknown chassis is not connected
    pub async fn is_connected(&self, chassis: &str) -> Result<bool> {
        self.check_session()?;
        let data = match self.get_request("connections", Some(chassis), None).await {
            Ok(response) => payload_json(response.payload)?,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };
        Ok(match data.get("IsConnected") {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        })
    }

    /// Connect to one or more chassis
    pub async fn connect_chassis(&self, chassis_list: &[&str]) -> Result<serde_json::Value> {
        self.check_session()?;
        match chassis_list {
            [] => Err(Error::InvalidArgument("no chassis given".to_string())),
            [one] => {
                let response = self.put_request(Some("connections"), Some(one), Params::new()).await?;
                Ok(serde_json::Value::Array(vec![payload_json(response.payload)?]))
            }
            many => {
                let params = chassis_params(many, "connect");
                let response = self.post_request("connections", None, params).await?;
                payload_json(response.payload)
            }
        }
    }

    /// Remove the connection to one or more chassis
    pub async fn disconnect_chassis(&self, chassis_list: &[&str]) -> Result<()> {
        self.check_session()?;
        match chassis_list {
            [] => return Err(Error::InvalidArgument("no chassis given".to_string())),
            [one] => {
                self.delete_request("connections", Some(one), None).await?;
            }
            many => {
                let params = chassis_params(many, "disconnect");
                self.post_request("connections", None, params).await?;
            }
        }
        Ok(())
    }

    pub async fn connect_all(&self) -> Result<()> {
        self.check_session()?;
        let params = Params::new().with("action", "connectall");
        self.post_request("connections", None, params).await?;
        Ok(())
    }

    pub async fn disconnect_all(&self) -> Result<()> {
        self.check_session()?;
        let params = Params::new().with("action", "disconnectall");
        self.post_request("connections", None, params).await?;
        Ok(())
    }

    /// Help text for the automation API.
    ///
    /// `subject` may be a command name, an object type or a handle; `args`
    /// narrow a search. Only the built-in command subjects work without a
    /// session.
    pub async fn help(&self, subject: Option<&str>, args: &[&str]) -> Result<String> {
        let response = match subject.filter(|s| !s.is_empty()) {
            Some(subject) => {
                if !SESSIONLESS_HELP.contains(&subject) {
                    self.check_session()?;
                }
                let query = Query::flags(args.iter().copied());
                self.get_request("help", Some(subject), Some(&query)).await?
            }
            None => self.get_request("help", None, None).await?,
        };

        match response.into_json()? {
            serde_json::Value::Array(items) => {
                Ok(items.iter().map(json_text).collect::<Vec<_>>().join(" "))
            }
            data => data
                .get("message")
                .map(json_text)
                .ok_or_else(|| Error::Protocol(format!("no message in help response: {data}"))),
        }
    }

    /// Write a diagnostic message to the server log
    pub async fn log(&self, level: &str, message: &str) -> Result<()> {
        self.check_session()?;
        let level = level.to_uppercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(Error::InvalidArgument(format!(
                "level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }
        let params = Params::new().with("log_level", level).with("message", message);
        self.post_request("log", None, params).await?;
        Ok(())
    }

    /// Block until the sequencer is idle or paused and return its `testState`.
    ///
    /// Fails once `timeout` worth of poll intervals has elapsed. With file
    /// sync enabled the session files are downloaded before returning.
    pub async fn wait_until_complete(&self, timeout: Option<Duration>) -> Result<String> {
        let sequencer = self.get_attr("system1", "children-sequencer").await?;
        let mut waited = Duration::ZERO;
        loop {
            let state = self.get_attr(&sequencer, "state").await?;
            if state.contains("PAUSE") || state.contains("IDLE") {
                break;
            }
            self.sleeper.sleep(SEQUENCER_POLL_INTERVAL).await;
            waited += SEQUENCER_POLL_INTERVAL;
            if let Some(limit) = timeout
                && waited >= limit
            {
                return Err(Error::Timeout(format!(
                    "wait_until_complete timed out after {} sec",
                    limit.as_secs()
                )));
            }
        }
        let test_state = self.get_attr(&sequencer, "testState").await?;
        if let Some(dir) = self.sync_dir() {
            let saved = self.download_all(Some(dir)).await?;
            tracing::info!(files = saved.len(), dir = %dir.display(), "synchronized session files");
        }
        Ok(test_state)
    }
}

fn chassis_params(chassis_list: &[&str], action: &str) -> Params {
    let mut params: Params = chassis_list.iter().map(|c| (*c, true)).collect();
    params.insert("action", action);
    params
}
