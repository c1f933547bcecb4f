#![forbid(unsafe_code)]

//! `headless-swarm-ctl` — local companion for inspecting launcher sessions.
//!
//! Reads the session records written by `headless-swarm` and can ask a
//! running launcher to cancel its session.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use headless_swarm::config::GlobalConfig;
use headless_swarm::models::session::{Session, SessionStatus};
use headless_swarm::orchestrator::launcher::{process_alive, signal_terminate};
use headless_swarm::orchestrator::session_tracker::SessionTracker;
use headless_swarm::{AppError, Result};

#[derive(Debug, Parser)]
#[command(
    name = "headless-swarm-ctl",
    about = "Inspect and cancel headless-swarm sessions",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the launcher's TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Session directory, overriding the configured one.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the current state of a session.
    Status {
        /// Session identifier.
        id: String,
    },

    /// List recorded sessions, newest first.
    List,

    /// Print the finalized orchestration summary of a session.
    Summary {
        /// Session identifier.
        id: String,
    },

    /// Ask the launcher running a session to cancel it.
    Cancel {
        /// Session identifier.
        id: String,
    },
}

fn main() {
    let args = Cli::parse();
    if let Err(err) = run(args) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(args: Cli) -> Result<()> {
    let output_dir = match args.output_dir {
        Some(dir) => dir,
        None => GlobalConfig::load_or_default(args.config.as_deref())?.output_dir(),
    };
    let tracker = SessionTracker::open(output_dir)?;

    match args.command {
        Command::Status { id } => print_json(&tracker.status(&id)?),
        Command::List => {
            for session in tracker.list()? {
                println!("{}", list_line(&session));
            }
            Ok(())
        }
        Command::Summary { id } => print_json(&tracker.summary(&id)?),
        Command::Cancel { id } => {
            let session = tracker.status(&id)?;
            if session.status.is_terminal() {
                return Err(AppError::Config(format!(
                    "session {id} already finished as {:?}",
                    session.status
                )));
            }
            if !process_alive(session.launcher_pid) {
                return Err(AppError::Process(format!(
                    "session {id} is stale: launcher pid {} is gone",
                    session.launcher_pid
                )));
            }
            signal_terminate(session.launcher_pid)?;
            println!("cancellation requested for {id} (launcher pid {})", session.launcher_pid);
            Ok(())
        }
    }
}

fn list_line(session: &Session) -> String {
    let status = match session.status {
        SessionStatus::Created | SessionStatus::Running if !process_alive(session.launcher_pid) => {
            "stale"
        }
        SessionStatus::Created => "created",
        SessionStatus::Running => "running",
        SessionStatus::Complete => "complete",
        SessionStatus::Failed => "failed",
    };
    format!(
        "{}  {:<8}  {}  {}",
        session.id,
        status,
        session.created_at.format("%Y-%m-%dT%H:%M:%SZ"),
        session.task.lines().next().unwrap_or_default()
    )
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::Io(format!("failed to render json: {err}")))?;
    println!("{body}");
    Ok(())
}
