//! Object commands - get, create, config, delete, perform, apply, help, log,
//! wait, port reservation and result subscriptions
//!
//! Every command except `help` runs inside the session given by `--session`.

use std::time::Duration;

use clap::{Args, Subcommand};
use serde::Serialize;
use stc_core::Attributes;

use super::{ConnectOpts, connect, connect_session, parse_params, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

#[derive(Subcommand, Debug)]
pub enum ObjectCommands {
    /// Read an object or some of its attributes
    Get(GetArgs),

    /// Create an object
    Create(CreateArgs),

    /// Set object attributes
    Config(ConfigArgs),

    /// Delete an object
    Delete(DeleteArgs),

    /// Execute a command
    Perform(PerformArgs),

    /// Send the configuration to the hardware
    Apply,

    /// Show help for a command, object type or handle
    Help(HelpArgs),

    /// Write a message to the server log
    Log(LogArgs),

    /// Wait for the sequencer to finish
    Wait(WaitArgs),

    /// Reserve ports, e.g. //10.1.1.2/1/1
    Reserve(LocationArgs),

    /// Release reserved ports
    Release(LocationArgs),

    /// Subscribe to result statistics
    Subscribe(SubscribeArgs),

    /// Drop a result subscription
    Unsubscribe(UnsubscribeArgs),
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Object handle, e.g. project1
    pub handle: String,

    /// Attributes to read; all when omitted
    pub attributes: Vec<String>,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Object type, e.g. port
    pub object_type: String,

    /// Parent handle
    #[arg(long)]
    pub under: Option<String>,

    /// Attributes as key=value
    pub attributes: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    pub handle: String,

    /// Attributes as key=value
    #[arg(required = true)]
    pub attributes: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub handle: String,
}

#[derive(Args, Debug)]
pub struct PerformArgs {
    /// Command name, e.g. LoadFromXml
    pub command: String,

    /// Command parameters as key=value
    pub params: Vec<String>,

    /// Upload the local file named by the file parameter first
    #[arg(long)]
    pub upload: bool,
}

#[derive(Args, Debug)]
pub struct HelpArgs {
    pub subject: Option<String>,

    /// Extra search terms
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// INFO, WARN, ERROR or FATAL
    pub level: String,

    pub message: String,
}

#[derive(Args, Debug)]
pub struct WaitArgs {
    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    pub max_wait: Option<u64>,
}

#[derive(Args, Debug)]
pub struct LocationArgs {
    /// Port locations
    #[arg(required = true)]
    pub locations: Vec<String>,
}

#[derive(Args, Debug)]
pub struct SubscribeArgs {
    /// Subscription parameters as key=value, e.g. ConfigType=Analyzer
    #[arg(required = true)]
    pub params: Vec<String>,
}

#[derive(Args, Debug)]
pub struct UnsubscribeArgs {
    /// Result data set handle returned by subscribe
    pub result_data_set: String,
}

#[derive(Debug, Serialize)]
struct HandleOutput {
    handle: String,
}

#[derive(Debug, Serialize)]
struct TestStateOutput {
    test_state: String,
}

/// Execute an object command
pub async fn execute(cmd: ObjectCommands, opts: &ConnectOpts, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    if let ObjectCommands::Help(args) = cmd {
        return execute_help(args, opts, &formatter).await;
    }

    let stc = match connect_session(opts, &formatter).await {
        Ok(stc) => stc,
        Err(code) => return code,
    };

    let result = match cmd {
        ObjectCommands::Get(args) => {
            let attrs: Vec<&str> = args.attributes.iter().map(String::as_str).collect();
            stc.get(&args.handle, &attrs).await.map(|a| print_attributes(&formatter, &a))
        }
        ObjectCommands::Create(args) => {
            let params = match parse_params(&args.attributes) {
                Ok(p) => p,
                Err(e) => return usage(&formatter, &e),
            };
            stc.create(&args.object_type, args.under.as_deref(), params)
                .await
                .map(|handle| {
                    if formatter.is_json() {
                        formatter.json(&HandleOutput { handle });
                    } else {
                        formatter.println(&formatter.style_name(&handle));
                    }
                })
        }
        ObjectCommands::Config(args) => {
            let params = match parse_params(&args.attributes) {
                Ok(p) => p,
                Err(e) => return usage(&formatter, &e),
            };
            stc.config(&args.handle, params)
                .await
                .map(|()| formatter.success(&format!("Configured {}", args.handle)))
        }
        ObjectCommands::Delete(args) => stc
            .delete(&args.handle)
            .await
            .map(|()| formatter.success(&format!("Deleted {}", args.handle))),
        ObjectCommands::Perform(args) => {
            let params = match parse_params(&args.params) {
                Ok(p) => p,
                Err(e) => return usage(&formatter, &e),
            };
            let data = if args.upload {
                stc.perform_with_upload(&args.command, params).await
            } else {
                stc.perform(&args.command, params).await
            };
            data.map(|data| formatter.value(&data))
        }
        ObjectCommands::Apply => stc.apply().await.map(|()| formatter.success("Applied")),
        ObjectCommands::Log(args) => stc
            .log(&args.level, &args.message)
            .await
            .map(|()| formatter.success("Logged")),
        ObjectCommands::Wait(args) => stc
            .wait_until_complete(args.max_wait.map(Duration::from_secs))
            .await
            .map(|test_state| {
                if formatter.is_json() {
                    formatter.json(&TestStateOutput { test_state });
                } else {
                    formatter.println(&test_state);
                }
            }),
        ObjectCommands::Reserve(args) => {
            let locations: Vec<&str> = args.locations.iter().map(String::as_str).collect();
            stc.reserve(&locations)
                .await
                .map(|()| formatter.success(&format!("Reserved {}", locations.join(" "))))
        }
        ObjectCommands::Release(args) => {
            let locations: Vec<&str> = args.locations.iter().map(String::as_str).collect();
            stc.release(&locations)
                .await
                .map(|()| formatter.success(&format!("Released {}", locations.join(" "))))
        }
        ObjectCommands::Subscribe(args) => {
            let params = match parse_params(&args.params) {
                Ok(p) => p,
                Err(e) => return usage(&formatter, &e),
            };
            stc.subscribe(params).await.map(|rds| match rds {
                Some(handle) if formatter.is_json() => formatter.json(&HandleOutput { handle }),
                Some(handle) => formatter.println(&formatter.style_name(&handle)),
                None => formatter.warning("No result data set returned"),
            })
        }
        ObjectCommands::Unsubscribe(args) => stc
            .unsubscribe(&args.result_data_set)
            .await
            .map(|()| formatter.success(&format!("Unsubscribed {}", args.result_data_set))),
        ObjectCommands::Help(_) => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => report(&formatter, &e),
    }
}

async fn execute_help(args: HelpArgs, opts: &ConnectOpts, formatter: &Formatter) -> ExitCode {
    let stc = if opts.session_id.is_some() {
        connect_session(opts, formatter).await
    } else {
        connect(opts, formatter).await
    };
    let stc = match stc {
        Ok(stc) => stc,
        Err(code) => return code,
    };

    let extra: Vec<&str> = args.args.iter().map(String::as_str).collect();
    match stc.help(args.subject.as_deref(), &extra).await {
        Ok(text) => {
            if formatter.is_json() {
                formatter.json(&serde_json::json!({ "help": text }));
            } else {
                formatter.println(&text);
            }
            ExitCode::Success
        }
        Err(e) => report(formatter, &e),
    }
}

fn print_attributes(formatter: &Formatter, attrs: &Attributes) {
    match attrs {
        Attributes::Single(value) => formatter.value(value),
        Attributes::Object(map) | Attributes::Multiple(map) => {
            formatter.value(&serde_json::Value::Object(map.clone()))
        }
    }
}

fn usage(formatter: &Formatter, message: &str) -> ExitCode {
    formatter.error(message);
    ExitCode::UsageError
}
