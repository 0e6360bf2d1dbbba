pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use leadloop_core::config::AppConfig;

#[derive(Debug, Parser)]
#[command(
    name = "leadloop",
    about = "Lead search refinement CLI",
    long_about = "Refine SuperSearch filters with an LLM advisor until the preview count lands in a target range, then optionally enrich the result.",
    after_help = "Examples:\n  leadloop run --goal \"CEOs of Colorado SaaS companies, 20-150 staff\"\n  leadloop run --goal-file goal.txt --enrich --list-name \"CO SaaS CEOs\"\n  leadloop preview --filters filters.json\n  leadloop status list-123 --wait\n  leadloop doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run the preview/refine loop and optionally enrich the final filters")]
    Run(commands::run::RunArgs),
    #[command(about = "Preview the lead count for a filter document without refining it")]
    Preview(commands::preview::PreviewArgs),
    #[command(about = "Read the enrichment status of a list or campaign")]
    Status(commands::status::StatusArgs),
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config {
        #[arg(long, help = "Path to leadloop.toml")]
        config: Option<PathBuf>,
    },
    #[command(about = "Validate config and credentials, optionally probing the preview endpoint")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
        #[arg(long, help = "Call the preview endpoint with an empty filter")]
        live: bool,
        #[arg(long, help = "Path to leadloop.toml")]
        config: Option<PathBuf>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run(args) => commands::run::run(args),
        Command::Preview(args) => commands::preview::run(args),
        Command::Status(args) => commands::status::run(args),
        Command::Config { config } => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(config) }
        }
        Command::Doctor { json, live, config } => commands::doctor::run(json, live, config),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Installs the global subscriber on stderr so stdout stays machine-readable.
/// A second call is a no-op.
pub fn init_logging(config: &AppConfig) {
    use leadloop_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };
}
