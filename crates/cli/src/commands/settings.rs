//! settings command - Show and edit the stored client configuration
//!
//! The file lives at `$STCREST_CONFIG_DIR/config.toml`, or under the user
//! config directory when the variable is unset.

use clap::{Args, Subcommand};
use serde::Serialize;
use stc_core::{ClientConfig, ConfigManager, ExistingSession};

use super::ConnectOpts;
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

#[derive(Args, Debug)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommands,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Print the stored configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Store the given connection flags and options
    Set(SetArgs),
}

#[derive(Args, Debug, Default)]
pub struct SetArgs {
    /// http or https
    #[arg(long)]
    pub scheme: Option<String>,

    /// Default session name
    #[arg(long)]
    pub session_name: Option<String>,

    /// kill, join or fail
    #[arg(long)]
    pub existing_session: Option<ExistingSession>,

    /// Terminate the session when the client closes it
    #[arg(long)]
    pub terminate_on_disconnect: Option<bool>,

    /// Download session files after the sequencer completes
    #[arg(long)]
    pub sync_files_on_complete: Option<bool>,
}

/// Stored configuration without the password
#[derive(Debug, Serialize)]
struct ConfigView {
    path: String,
    server: Option<String>,
    port: Option<u16>,
    scheme: String,
    base_path: String,
    api_version: u32,
    user: Option<String>,
    password_set: bool,
    timeout_secs: Option<u64>,
    session_name: Option<String>,
    existing_session: ExistingSession,
    terminate_on_disconnect: bool,
    sync_files_on_complete: bool,
}

impl ConfigView {
    fn new(manager: &ConfigManager, c: ClientConfig) -> Self {
        Self {
            path: manager.path().display().to_string(),
            password_set: c.password.is_some(),
            server: c.server,
            port: c.port,
            scheme: c.scheme,
            base_path: c.base_path,
            api_version: c.api_version,
            user: c.user,
            timeout_secs: c.timeout_secs,
            session_name: c.session_name,
            existing_session: c.existing_session,
            terminate_on_disconnect: c.terminate_on_disconnect,
            sync_files_on_complete: c.sync_files_on_complete,
        }
    }
}

/// Execute the settings command
pub async fn execute(args: SettingsArgs, opts: &ConnectOpts, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let manager = match ConfigManager::new() {
        Ok(m) => m,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::GeneralError;
        }
    };
    run(args.command, opts, &manager, &formatter)
}

fn run(
    command: SettingsCommands,
    opts: &ConnectOpts,
    manager: &ConfigManager,
    formatter: &Formatter,
) -> ExitCode {
    let config = match manager.load() {
        Ok(c) => c,
        Err(e) => {
            formatter.error(&format!("Failed to load configuration: {e}"));
            return ExitCode::GeneralError;
        }
    };

    match command {
        SettingsCommands::Path => {
            formatter.println(&manager.path().display().to_string());
            ExitCode::Success
        }
        SettingsCommands::Show => {
            let view = ConfigView::new(manager, config);
            match serde_json::to_value(&view) {
                Ok(v) => formatter.value(&v),
                Err(e) => formatter.error(&e.to_string()),
            }
            ExitCode::Success
        }
        SettingsCommands::Set(args) => {
            let config = apply_set(config, opts, args);
            // The server may be supplied later by flag or environment
            let check = ClientConfig {
                server: config.server.clone().or_else(|| Some("localhost".to_string())),
                ..config.clone()
            };
            if let Err(e) = check.validate().and_then(|()| manager.save(&config)) {
                formatter.error(&format!("Failed to save configuration: {e}"));
                return ExitCode::UsageError;
            }
            formatter.success(&format!("Saved {}", manager.path().display()));
            ExitCode::Success
        }
    }
}

fn apply_set(mut config: ClientConfig, opts: &ConnectOpts, args: SetArgs) -> ClientConfig {
    if opts.server.is_some() {
        config.server = opts.server.clone();
    }
    if opts.port.is_some() {
        config.port = opts.port;
    }
    if opts.user.is_some() {
        config.user = opts.user.clone();
    }
    if opts.password.is_some() {
        config.password = opts.password.clone();
    }
    if opts.timeout.is_some() {
        config.timeout_secs = opts.timeout;
    }
    if let Some(scheme) = args.scheme {
        config.scheme = scheme;
    }
    if args.session_name.is_some() {
        config.session_name = args.session_name;
    }
    if let Some(policy) = args.existing_session {
        config.existing_session = policy;
    }
    if let Some(flag) = args.terminate_on_disconnect {
        config.terminate_on_disconnect = flag;
    }
    if let Some(flag) = args.sync_files_on_complete {
        config.sync_files_on_complete = flag;
    }
    config
}
