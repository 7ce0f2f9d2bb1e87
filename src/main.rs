//! `repcast` CLI - count reps, coach out loud, restream the annotated video

mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use repcast::Settings;

use cmd::run::RunArgs;

#[derive(Parser)]
#[command(name = "repcast")]
#[command(about = "Exercise rep counter with spoken feedback and live restreaming")]
#[command(version)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Config file (default: ~/.config/repcast/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an exercise session and stream it
    Run(RunArgs),

    /// List available exercises
    Profiles,

    /// Print the last persisted session report
    Report {
        /// Report file (default: from config, else results.txt)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that ffmpeg and a speech program are installed
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            cmd::run::cmd_run(args, settings).await?;
        }
        Commands::Profiles => {
            cmd::profiles::cmd_profiles(&settings)?;
        }
        Commands::Report { path, json } => {
            cmd::report::cmd_report(path, json, &settings).await?;
        }
        Commands::Check => {
            cmd::check::cmd_check(&settings).await?;
        }
    }

    Ok(())
}

/// Logs go to stderr; stdout carries command output only.
fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
