//! session command - List, inspect, create and end test sessions

use clap::{Args, Subcommand};
use serde::Serialize;
use stc_core::{ClientConfig, EndMode, ExistingSession};

use super::{ConnectOpts, connect, connect_with, load_config, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Manage test sessions
#[derive(Args, Debug)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub command: SessionCommands,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// List sessions on the server
    List(ListArgs),

    /// Show information about a session
    Info(InfoArgs),

    /// Create a session and leave it running
    New(NewArgs),

    /// End a session
    End(EndArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Include session URLs
    #[arg(short, long)]
    pub long: bool,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Session id ("<name> - <user>")
    pub session: String,
}

#[derive(Args, Debug)]
pub struct NewArgs {
    /// Session name; defaults to the configured one, else the server picks
    #[arg(long)]
    pub name: Option<String>,

    /// Owner of the session
    #[arg(long)]
    pub user_name: Option<String>,

    /// What to do if the session already exists: kill, join or fail
    #[arg(long)]
    pub existing: Option<ExistingSession>,

    /// Enable or disable analytics for the session
    #[arg(long)]
    pub analytics: Option<bool>,
}

#[derive(Args, Debug)]
pub struct EndArgs {
    /// Session id ("<name> - <user>")
    pub session: String,

    /// terminate, kill, leave or detach; defaults to leave, or terminate
    /// when STC_SESSION_TERMINATE_ON_DISCONNECT is set
    #[arg(long)]
    pub mode: Option<EndMode>,
}

#[derive(Debug, Serialize)]
struct SessionEntry {
    session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

#[derive(Debug, Serialize)]
struct SessionOperation {
    session_id: String,
    action: String,
}

/// Execute the session command
pub async fn execute(args: SessionArgs, opts: &ConnectOpts, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    match args.command {
        SessionCommands::List(a) => execute_list(a, opts, &formatter).await,
        SessionCommands::Info(a) => execute_info(a, opts, &formatter).await,
        SessionCommands::New(a) => execute_new(a, opts, &formatter).await,
        SessionCommands::End(a) => execute_end(a, opts, &formatter).await,
    }
}

async fn execute_list(args: ListArgs, opts: &ConnectOpts, formatter: &Formatter) -> ExitCode {
    let stc = match connect(opts, formatter).await {
        Ok(stc) => stc,
        Err(code) => return code,
    };
    let sessions = match stc.sessions().await {
        Ok(s) => s,
        Err(e) => return report(formatter, &e),
    };

    let entries: Vec<SessionEntry> = sessions
        .into_iter()
        .map(|sid| SessionEntry {
            url: args.long.then(|| stc.make_url("sessions", Some(&sid))),
            session_id: sid,
        })
        .collect();

    if formatter.is_json() {
        formatter.json(&entries);
    } else if entries.is_empty() {
        formatter.println("No sessions.");
    } else if args.long {
        formatter.table(
            &["Session", "URL"],
            entries
                .iter()
                .map(|e| vec![e.session_id.clone(), e.url.clone().unwrap_or_default()]),
        );
    } else {
        for e in &entries {
            formatter.println(&formatter.style_name(&e.session_id));
        }
    }
    ExitCode::Success
}

async fn execute_info(args: InfoArgs, opts: &ConnectOpts, formatter: &Formatter) -> ExitCode {
    let stc = match connect(opts, formatter).await {
        Ok(stc) => stc,
        Err(code) => return code,
    };
    match stc.session_info(Some(&args.session)).await {
        Ok(Some(info)) => {
            formatter.value(&info);
            ExitCode::Success
        }
        Ok(None) => {
            formatter.error(&format!("no information for session {}", args.session));
            ExitCode::NotFound
        }
        Err(e) => report(formatter, &e),
    }
}

/// Session name and existing-session policy for `session new`
fn new_session_target(args: &NewArgs, config: &ClientConfig) -> (Option<String>, ExistingSession) {
    (
        config.session_name_for(args.name.as_deref()),
        args.existing.unwrap_or(config.existing_session),
    )
}

async fn execute_new(args: NewArgs, opts: &ConnectOpts, formatter: &Formatter) -> ExitCode {
    let config = match load_config(opts, formatter) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let mut stc = match connect_with(&config, formatter).await {
        Ok(stc) => stc,
        Err(code) => return code,
    };

    let (name, policy) = new_session_target(&args, &config);
    let result = stc
        .start_session_with_analytics(args.user_name.as_deref(), name.as_deref(), policy, args.analytics)
        .await;

    match result {
        Ok(sid) => {
            if formatter.is_json() {
                formatter.json(&SessionOperation {
                    session_id: sid,
                    action: "started".to_string(),
                });
            } else {
                formatter.success(&format!("Session {} started", formatter.style_name(&sid)));
            }
            ExitCode::Success
        }
        Err(e) => report(formatter, &e),
    }
}

async fn execute_end(args: EndArgs, opts: &ConnectOpts, formatter: &Formatter) -> ExitCode {
    let mut stc = match connect(opts, formatter).await {
        Ok(stc) => stc,
        Err(code) => return code,
    };

    let mode = args.mode.unwrap_or(stc.close_mode());
    if mode == EndMode::Detach {
        formatter.warning("detach only affects this client; the session keeps running");
    }
    match stc.end_session(mode, Some(&args.session)).await {
        Ok(_) => {
            if formatter.is_json() {
                formatter.json(&SessionOperation {
                    session_id: args.session,
                    action: mode.to_string(),
                });
            } else {
                formatter.success(&format!(
                    "Session {} ended ({})",
                    formatter.style_name(&args.session),
                    mode
                ));
            }
            ExitCode::Success
        }
        Err(e) => report(formatter, &e),
    }
}
