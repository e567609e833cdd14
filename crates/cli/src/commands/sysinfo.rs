//! sysinfo command - Show STC server and API information

use clap::Args;

use super::{ConnectOpts, connect, connect_session, report};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Show server and API information
#[derive(Args, Debug)]
pub struct SysinfoArgs {
    /// Show the system1 object instead of the API summary
    #[arg(long, conflicts_with = "in_session")]
    pub object: bool,

    /// Read the info inside a session, joining an existing one or starting
    /// a temporary one when none is active
    #[arg(long)]
    pub in_session: bool,
}

/// Execute the sysinfo command
pub async fn execute(args: SysinfoArgs, opts: &ConnectOpts, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let stc = if opts.session_id.is_some() {
        connect_session(opts, &formatter).await
    } else {
        connect(opts, &formatter).await
    };
    let mut stc = match stc {
        Ok(stc) => stc,
        Err(code) => return code,
    };

    let info = if args.object {
        stc.server_info().await
    } else if args.in_session {
        stc.session_system_info().await
    } else {
        stc.system_info().await
    };
    match info {
        Ok(value) => {
            if !formatter.is_json() {
                formatter.println(&format!(
                    "Server: {}",
                    formatter.style_url(stc.endpoint().base_url())
                ));
            }
            formatter.value(&value);
            ExitCode::Success
        }
        Err(e) => report(&formatter, &e),
    }
}
