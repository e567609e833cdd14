//! chassis command - Chassis connections of the session

use clap::{Args, Subcommand};

use super::{ConnectOpts, connect_session, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Manage chassis connections
#[derive(Args, Debug)]
pub struct ChassisArgs {
    #[command(subcommand)]
    pub command: ChassisCommands,
}

#[derive(Subcommand, Debug)]
pub enum ChassisCommands {
    /// List known chassis, or show one
    List(InfoArgs),

    /// Show current connections
    Connections,

    /// Check whether a chassis is connected
    Status(InfoArgs),

    /// Connect to chassis
    Connect(TargetArgs),

    /// Disconnect from chassis
    Disconnect(TargetArgs),
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Chassis address
    pub chassis: Option<String>,
}

#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Chassis addresses
    #[arg(required_unless_present = "all")]
    pub chassis: Vec<String>,

    /// Apply to every chassis
    #[arg(long)]
    pub all: bool,
}

/// Execute the chassis command
pub async fn execute(args: ChassisArgs, opts: &ConnectOpts, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let stc = match connect_session(opts, &formatter).await {
        Ok(stc) => stc,
        Err(code) => return code,
    };

    let result = match args.command {
        ChassisCommands::List(a) => {
            let info = match a.chassis.as_deref() {
                Some(c) => stc.chassis_info(c).await,
                None => stc.chassis().await,
            };
            info.map(|v| formatter.value(&v))
        }
        ChassisCommands::Connections => stc.connections().await.map(|v| formatter.value(&v)),
        ChassisCommands::Status(a) => {
            let Some(chassis) = a.chassis else {
                formatter.error("missing chassis address");
                return ExitCode::UsageError;
            };
            stc.is_connected(&chassis).await.map(|connected| {
                if formatter.is_json() {
                    formatter.json(&serde_json::json!({ "chassis": chassis, "connected": connected }));
                } else if connected {
                    formatter.println(&format!("{chassis} connected"));
                } else {
                    formatter.println(&format!("{chassis} not connected"));
                }
            })
        }
        ChassisCommands::Connect(a) => {
            let result = if a.all {
                stc.connect_all().await
            } else {
                let list: Vec<&str> = a.chassis.iter().map(String::as_str).collect();
                stc.connect_chassis(&list).await.map(|_| ())
            };
            result.map(|()| formatter.success("Connected"))
        }
        ChassisCommands::Disconnect(a) => {
            let result = if a.all {
                stc.disconnect_all().await
            } else {
                let list: Vec<&str> = a.chassis.iter().map(String::as_str).collect();
                stc.disconnect_chassis(&list).await
            };
            result.map(|()| formatter.success("Disconnected"))
        }
    };

    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => report(&formatter, &e),
    }
}
