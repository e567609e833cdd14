//! Command implementations
//!
//! Each subcommand module exposes an `execute` function that returns an
//! `ExitCode`. Shared plumbing for resolving configuration, connecting and
//! joining a session lives here.

pub mod chassis;
pub mod files;
pub mod object;
pub mod session;
pub mod settings;
pub mod sysinfo;

use anyhow::Context as _;
use clap::Args;
use stc_core::{ClientConfig, ConfigManager, Params};
use stc_http::StcHttp;

use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Connection flags shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectOpts {
    /// STC server address
    #[arg(short = 's', long, global = true)]
    pub server: Option<String>,

    /// Server port; without it ports 80 and 8888 are tried
    #[arg(short = 'p', long, global = true)]
    pub port: Option<u16>,

    /// User for basic authentication
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Password for basic authentication
    #[arg(long, global = true, env = "STCREST_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Session to join, as "<name> - <user>"
    #[arg(long = "session", global = true, env = "STC_SESSION_ID")]
    pub session_id: Option<String>,
}

/// Resolve the configuration: flags, then environment, then the config file
pub fn resolve_config<F>(
    opts: &ConnectOpts,
    manager: &ConfigManager,
    env: F,
) -> anyhow::Result<ClientConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = manager
        .load()
        .with_context(|| format!("failed to load {}", manager.path().display()))?;
    config.apply_env_from(env).context("invalid environment")?;

    if let Some(server) = &opts.server {
        config.server = Some(server.clone());
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
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Resolve the configuration from flags, environment and file, printing the failure
pub fn load_config(opts: &ConnectOpts, formatter: &Formatter) -> Result<ClientConfig, ExitCode> {
    let manager = match ConfigManager::new() {
        Ok(m) => m,
        Err(e) => {
            formatter.error(&e.to_string());
            return Err(ExitCode::UsageError);
        }
    };
    match resolve_config(opts, &manager, |k| std::env::var(k).ok()) {
        Ok(config) => {
            tracing::debug!(
                server = config.server.as_deref().unwrap_or_default(),
                port = ?config.port,
                file = %manager.path().display(),
                "resolved configuration"
            );
            Ok(config)
        }
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            Err(ExitCode::UsageError)
        }
    }
}

/// Connect with an already resolved configuration
pub async fn connect_with(config: &ClientConfig, formatter: &Formatter) -> Result<StcHttp, ExitCode> {
    stc_http::connect(config).await.map_err(|e| {
        formatter.error(&e.to_string());
        ExitCode::from_error(&e)
    })
}

/// Connect to the configured server, printing the failure
pub async fn connect(opts: &ConnectOpts, formatter: &Formatter) -> Result<StcHttp, ExitCode> {
    let config = load_config(opts, formatter)?;
    connect_with(&config, formatter).await
}

/// Connect and join the session named by `--session`
pub async fn connect_session(opts: &ConnectOpts, formatter: &Formatter) -> Result<StcHttp, ExitCode> {
    let Some(sid) = opts.session_id.as_deref() else {
        formatter.error("no session given; use --session \"<name> - <user>\"");
        return Err(ExitCode::UsageError);
    };
    let mut stc = connect(opts, formatter).await?;
    if let Err(e) = stc.join_session(sid).await {
        formatter.error(&e.to_string());
        return Err(ExitCode::from_error(&e));
    }
    Ok(stc)
}

/// Parse `key=value` arguments into ordered parameters
pub fn parse_params(items: &[String]) -> Result<Params, String> {
    let mut params = Params::new();
    for item in items {
        let Some((key, value)) = item.split_once('=') else {
            return Err(format!("expected key=value, got '{item}'"));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("missing key in '{item}'"));
        }
        params.insert(key, value);
    }
    Ok(params)
}

/// Print the error and map it to an exit code
pub fn report(formatter: &Formatter, error: &stc_core::Error) -> ExitCode {
    formatter.error(&error.to_string());
    ExitCode::from_error(error)
}
