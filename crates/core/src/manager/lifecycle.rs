//! Session lifecycle: create, join, end and list

use http::HeaderValue;

use super::{SESSION_HEADER, SessionManager};
use crate::address::Query;
use crate::error::{ApiError, Error, Result};
use crate::poll::poll_until;
use crate::session::{ApiVersion, EndMode, ExistingSession, SessionId};
use crate::transport::{Payload, Transport};
use crate::value::Params;

/// Result of one session-create request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// Server created the session and returned its id
    Created(String),
    /// A session with the requested id is already running
    AlreadyExists(String),
}

/// Whether a create failure means the session is already running.
///
/// 409 Conflict is the structured signal; servers that answer with another
/// status are recognised by their "already exists" detail text.
fn is_already_exists(error: &ApiError) -> bool {
    error.status == 409 || error.detail.to_lowercase().contains("already exists")
}

/// User name of the temporary session opened for system information
const ANONYMOUS_USER: &str = "anonymous";

/// Names made only of whitespace count as unset; others are sent as given
fn blank_to_empty(name: Option<&str>) -> &str {
    name.filter(|n| !n.trim().is_empty()).unwrap_or_default()
}

fn end_failed(e: Error) -> Error {
    Error::EndFailed(Box::new(e))
}

impl<T: Transport> SessionManager<T> {
    /// Create a new test session.
    ///
    /// Returns `Ok(None)` without contacting the server when a session is
    /// already active. When the server reports the session exists and
    /// `kill_existing` is set, the existing session is killed and creation is
    /// retried exactly once.
    pub async fn new_session(
        &mut self,
        user_name: Option<&str>,
        session_name: Option<&str>,
        kill_existing: bool,
    ) -> Result<Option<String>> {
        self.new_session_with_analytics(user_name, session_name, kill_existing, None)
            .await
    }

    /// `new_session` with an explicit analytics setting; `None` keeps the server's
    pub async fn new_session_with_analytics(
        &mut self,
        user_name: Option<&str>,
        session_name: Option<&str>,
        kill_existing: bool,
        analytics: Option<bool>,
    ) -> Result<Option<String>> {
        if self.started() {
            return Ok(None);
        }

        let user_name = blank_to_empty(user_name);
        let session_name = blank_to_empty(session_name);
        let mut params = Params::new()
            .with("userid", user_name)
            .with("sessionname", session_name);
        if let Some(analytics) = analytics {
            params.insert("analytics", analytics.to_string());
        }

        let sid = match self.create_session(&params, session_name, user_name).await? {
            CreateOutcome::Created(sid) => sid,
            CreateOutcome::AlreadyExists(existing) if kill_existing => {
                tracing::warn!(session = %existing, "session already exists, killing it");
                self.end_session(EndMode::Kill, Some(&existing)).await?;
                match self.create_session(&params, session_name, user_name).await? {
                    CreateOutcome::Created(sid) => sid,
                    CreateOutcome::AlreadyExists(session_id) => {
                        return Err(Error::SessionExists { session_id });
                    }
                }
            }
            CreateOutcome::AlreadyExists(session_id) => {
                return Err(Error::SessionExists { session_id });
            }
        };

        self.bind_session(&sid)?;
        tracing::info!(session = %sid, url = %self.make_url("sessions", Some(&sid)), "session started");
        Ok(Some(sid))
    }

    /// Issue one `POST sessions`
    pub async fn create_session(
        &self,
        params: &Params,
        session_name: &str,
        user_name: &str,
    ) -> Result<CreateOutcome> {
        match self.post_request("sessions", None, params.clone()).await {
            Ok(response) => {
                let data = response.into_json().map_err(|e| Error::CreateFailed(Box::new(e)))?;
                let sid = data
                    .get("session_id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        Error::CreateFailed(Box::new(Error::Protocol(format!(
                            "no session_id in response: {data}"
                        ))))
                    })?;
                Ok(CreateOutcome::Created(sid.to_string()))
            }
            Err(Error::Api(e)) if is_already_exists(&e) => {
                let existing = SessionId::new(session_name, user_name)?;
                Ok(CreateOutcome::AlreadyExists(existing.to_string()))
            }
            Err(e @ Error::Api(_)) => Err(Error::CreateFailed(Box::new(e))),
            Err(e) => Err(e),
        }
    }

    /// Attach to an existing session and return its BLL version.
    ///
    /// The session header is bound first and removed again if the check
    /// fails, so a failed join leaves no session active.
    pub async fn join_session(&mut self, sid: &str) -> Result<String> {
        if let Some(active) = &self.session_id {
            return Err(Error::SessionActive(active.clone()));
        }
        self.bind_session(sid)?;

        match self.system_version().await {
            Ok(version) => {
                tracing::info!(session = %sid, version = %version, "joined session");
                Ok(version)
            }
            Err(e) => {
                self.unbind_session();
                Err(Error::JoinFailed {
                    session_id: sid.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Create a session, resolving a name clash according to `policy`
    pub async fn start_session(
        &mut self,
        user_name: Option<&str>,
        session_name: Option<&str>,
        policy: ExistingSession,
    ) -> Result<String> {
        self.start_session_with_analytics(user_name, session_name, policy, None)
            .await
    }

    /// `start_session` with an explicit analytics setting for a new session
    pub async fn start_session_with_analytics(
        &mut self,
        user_name: Option<&str>,
        session_name: Option<&str>,
        policy: ExistingSession,
        analytics: Option<bool>,
    ) -> Result<String> {
        if let Some(active) = &self.session_id {
            return Err(Error::SessionActive(active.clone()));
        }
        let kill = policy == ExistingSession::Kill;
        match self
            .new_session_with_analytics(user_name, session_name, kill, analytics)
            .await
        {
            Ok(Some(sid)) => Ok(sid),
            Ok(None) => Err(Error::SessionActive(
                self.session_id.clone().unwrap_or_default(),
            )),
            Err(Error::SessionExists { session_id }) if policy == ExistingSession::Join => {
                self.join_session(&session_id).await?;
                Ok(session_id)
            }
            Err(e) => Err(e),
        }
    }

    /// End a session.
    ///
    /// With `sid` unset or equal to the active session, the active session is
    /// ended and local state is cleared before the server is contacted, so it
    /// stays cleared even if the server call fails. Returns `Ok(false)` when
    /// there is no active session to end.
    pub async fn end_session(&mut self, mode: EndMode, sid: Option<&str>) -> Result<bool> {
        let sid = match sid.filter(|s| !s.is_empty()) {
            Some(s) if self.session_id.as_deref() != Some(s) => s.to_string(),
            _ => match self.unbind_session() {
                Some(active) => active,
                None => return Ok(false),
            },
        };

        match mode {
            EndMode::Detach => {
                tracing::info!(session = %sid, "detached from session");
            }
            EndMode::Leave => {
                if self.api_version().await < ApiVersion::LEAVE_SESSION {
                    return Err(Error::Unsupported(format!(
                        "leaving a test session requires stcapi {} or later",
                        ApiVersion::LEAVE_SESSION
                    )));
                }
                let query = Query::flags(mode.query_token());
                self.delete_request("sessions", Some(&sid), Some(&query))
                    .await
                    .map_err(end_failed)?;
                tracing::info!(session = %sid, "detached controller, test session left running");
            }
            EndMode::Kill => {
                let query = Query::flags(mode.query_token());
                self.delete_request("sessions", Some(&sid), Some(&query))
                    .await
                    .map_err(end_failed)?;
                tracing::info!(session = %sid, "killed test session");
            }
            EndMode::Terminate => {
                self.delete_request("sessions", Some(&sid), None)
                    .await
                    .map_err(end_failed)?;
                self.wait_for_session_end(&sid).await?;
                tracing::info!(session = %sid, "terminated test session");
            }
        }
        Ok(true)
    }

    /// End the active session the way this client was configured to
    /// (`with_close_mode`): leave it running by default, or terminate it.
    pub async fn close(&mut self) -> Result<bool> {
        self.end_session(self.close_mode, None).await
    }

    /// System information gathered inside a session.
    ///
    /// Uses the active session if there is one. Otherwise joins the first
    /// session on the server and detaches afterwards, or, when the server has
    /// none, starts a temporary `anonymous` session and terminates it.
    pub async fn session_system_info(&mut self) -> Result<serde_json::Value> {
        if self.started() {
            return self.system_info().await;
        }

        if let Some(existing) = self.sessions().await?.into_iter().next() {
            self.join_session(&existing).await?;
            let info = self.system_info().await;
            self.end_session(EndMode::Detach, None).await?;
            return info;
        }

        self.new_session(Some(ANONYMOUS_USER), None, false).await?;
        let info = self.system_info().await;
        let ended = self.end_session(EndMode::Terminate, None).await;
        match (info, ended) {
            (Err(e), _) | (Ok(_), Err(e)) => Err(e),
            (Ok(info), Ok(_)) => Ok(info),
        }
    }

    async fn wait_for_session_end(&self, sid: &str) -> Result<()> {
        let this = &*self;
        let gone = poll_until(&self.poll, self.sleeper.as_ref(), || async move {
            tracing::debug!(session = %sid, "checking if session ended");
            let sessions = this.sessions().await?;
            Ok(!sessions.iter().any(|s| s == sid))
        })
        .await
        .map_err(end_failed)?;

        if gone {
            Ok(())
        } else {
            Err(Error::SessionNotStopped(sid.to_string()))
        }
    }

    /// Ids of all sessions on the server
    pub async fn sessions(&self) -> Result<Vec<String>> {
        let response = self.get_request("sessions", None, None).await?;
        match response.payload {
            Payload::Empty => Ok(Vec::new()),
            payload => {
                let data = payload.into_json()?;
                Ok(serde_json::from_value(data)?)
            }
        }
    }

    /// URL of every session on the server
    pub async fn session_urls(&self) -> Result<Vec<String>> {
        Ok(self
            .sessions()
            .await?
            .iter()
            .map(|sid| self.make_url("sessions", Some(sid)))
            .collect())
    }

    /// Information about `sid`, or the active session when `sid` is unset.
    ///
    /// Returns `Ok(None)` when no id is given and no session is active.
    pub async fn session_info(&self, sid: Option<&str>) -> Result<Option<serde_json::Value>> {
        let sid = match sid.or(self.session_id.as_deref()) {
            Some(sid) => sid.to_string(),
            None => return Ok(None),
        };
        let response = self.get_request("sessions", Some(&sid), None).await?;
        Ok(Some(response.into_json()?))
    }

    /// Server automation API version, cached after the first successful lookup.
    ///
    /// Any failure yields `0.0.0`.
    pub async fn api_version(&mut self) -> ApiVersion {
        if let Some(v) = self.api_version {
            return v;
        }
        match self.fetch_api_version().await {
            Ok(v) => {
                tracing::debug!(version = %v, "stcapi version");
                self.api_version = Some(v);
                v
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to get stcapi_version");
                ApiVersion::default()
            }
        }
    }

    async fn fetch_api_version(&self) -> Result<ApiVersion> {
        let data = self.get_request("system", None, None).await?.into_json()?;
        data.get("stcapi_version")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Protocol("failed to get stcapi_version".to_string()))?
            .parse()
    }

    pub(crate) async fn system_version(&self) -> Result<String> {
        let query = Query::flags(["version", "name"]);
        let data = self
            .get_request("objects", Some("system1"), Some(&query))
            .await?
            .into_json()?;
        data.get("version")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Protocol(format!("no version in system1 response: {data}")))
    }

    pub(crate) fn bind_session(&mut self, sid: &str) -> Result<()> {
        let value = HeaderValue::from_str(sid)
            .map_err(|_| Error::InvalidSessionId(format!("not a valid header value: {sid}")))?;
        self.headers.insert(SESSION_HEADER, value);
        self.session_id = Some(sid.to_string());
        tracing::debug!(session = %sid, "session bound");
        Ok(())
    }

    pub(crate) fn unbind_session(&mut self) -> Option<String> {
        self.headers.remove(SESSION_HEADER);
        self.session_id.take()
    }
}
