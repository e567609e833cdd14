//! stcrest - command-line client for the Spirent TestCenter REST API

mod commands;
mod exit_code;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::ConnectOpts;
use exit_code::ExitCode;
use output::OutputConfig;

#[derive(Parser, Debug)]
#[command(
    name = "stcrest",
    version,
    about = "Spirent TestCenter REST client",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(flatten)]
    connect: ConnectOpts,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log requests and responses (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show server and API information
    Sysinfo(commands::sysinfo::SysinfoArgs),

    /// Manage test sessions
    Session(commands::session::SessionArgs),

    #[command(flatten)]
    Object(commands::object::ObjectCommands),

    /// Transfer session files
    Files(commands::files::FilesArgs),

    /// Manage chassis connections
    Chassis(commands::chassis::ChassisArgs),

    /// Show or edit the stored configuration
    Settings(commands::settings::SettingsArgs),
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output_config = OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        quiet: cli.quiet,
    };
    let opts = &cli.connect;

    let code: ExitCode = match cli.command {
        Commands::Sysinfo(args) => commands::sysinfo::execute(args, opts, output_config).await,
        Commands::Session(args) => commands::session::execute(args, opts, output_config).await,
        Commands::Object(cmd) => commands::object::execute(cmd, opts, output_config).await,
        Commands::Files(args) => commands::files::execute(args, opts, output_config).await,
        Commands::Chassis(args) => commands::chassis::execute(args, opts, output_config).await,
        Commands::Settings(args) => commands::settings::execute(args, opts, output_config).await,
    };
    code.into()
}
