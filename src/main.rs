#![forbid(unsafe_code)]

//! `headless-swarm` — launches a swarm orchestration run through an
//! MCP-enabled agent CLI and reports the reconstructed result.
//!
//! Resolves configuration, decides the execution mode, hands the
//! collaborator its descriptor and limits, and prints a JSON session
//! report on stdout. Logs go to stderr.

use std::path::PathBuf;
use std::process::{ExitCode, Stdio};

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use headless_swarm::config::GlobalConfig;
use headless_swarm::mode::{detect_mode, process_env, InvocationSignals};
use headless_swarm::models::execution::OutputFormat;
use headless_swarm::models::session::{Session, SessionError, SessionStatus};
use headless_swarm::models::summary::OrchestrationSummary;
use headless_swarm::orchestrator::builder::{build_execution_config, LaunchOptions};
use headless_swarm::orchestrator::runner::{SessionReport, SessionRunner};
use headless_swarm::{AppError, Result};

/// Exit code for failures that happen before any session exists.
const EXIT_CONFIG: u8 = 2;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "headless-swarm",
    about = "Run a swarm orchestration task through an MCP-enabled agent CLI",
    version,
    long_about = None
)]
struct Cli {
    /// Task description handed to the collaborator.
    task: String,

    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Run headless: print mode, no approval prompts.
    #[arg(long)]
    executor: bool,

    /// Collaborator output format; `stream-json` implies headless.
    #[arg(long, value_enum)]
    output_format: Option<OutputFormat>,

    /// Detach and return the session id immediately.
    #[arg(long)]
    background: bool,

    /// Bound on collaborator turns.
    #[arg(long)]
    max_turns: Option<u32>,

    /// Tool allow-list pattern (repeatable).
    #[arg(long = "allowed-tools", value_name = "PATTERN")]
    allowed_tools: Vec<String>,

    /// Model to fall back to when the primary is unavailable.
    #[arg(long)]
    fallback_model: Option<String>,

    /// Path to the collaborator-process descriptor.
    #[arg(long)]
    mcp_config: Option<PathBuf>,

    /// Wall-clock limit for the session, in seconds.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Treat CI environment variables as a headless signal.
    #[arg(long)]
    detect_ci: bool,

    /// Adopt a session issued by a `--background` parent.
    #[arg(long, hide = true)]
    session_id: Option<String>,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::from(EXIT_CONFIG);
    }
    info!("headless-swarm bootstrap");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "failed to build tokio runtime");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match runtime.block_on(run(args)) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!(%err, "headless-swarm failed");
            eprintln!("{err}");
            ExitCode::from(match err {
                AppError::Config(_) => EXIT_CONFIG,
                _ => 1,
            })
        }
    }
}

async fn run(args: Cli) -> Result<u8> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_or_default(args.config.as_deref())?;
    if let Some(secs) = args.timeout {
        config.session_timeout_seconds = secs;
    }
    config.detect_ci |= args.detect_ci;
    info!("configuration loaded");

    // ── Decide mode and build the execution config ──────
    let signals = InvocationSignals {
        executor: args.executor,
        output_format: args.output_format,
        background: args.background,
        detect_ci: config.detect_ci,
    };
    let decision = detect_mode(&signals, &process_env());
    info!(mode = ?decision.mode, reason = ?decision.reason, "execution mode decided");

    let options = LaunchOptions {
        allowed_tools: args.allowed_tools.clone(),
        max_turns: args.max_turns,
        fallback_model: args.fallback_model.clone(),
        output_format: args.output_format,
        mcp_config: args.mcp_config.clone(),
    };
    let execution = build_execution_config(decision.is_headless(), &options, &config)?;

    let runner = SessionRunner::from_config(&config)?;
    let session = match &args.session_id {
        Some(id) => runner.tracker().adopt(id)?,
        None => runner.tracker().create(&args.task, decision.is_headless())?,
    };

    if args.background && args.session_id.is_none() {
        if let Err(err) = detach(&session) {
            let mut summary = OrchestrationSummary::default();
            summary.finalize();
            runner.tracker().finish(
                &session.id,
                SessionStatus::Failed,
                None,
                vec![SessionError::from(&err)],
                &summary,
            )?;
            return Err(err);
        }
        print_session(&session);
        return Ok(0);
    }

    // ── Run until exit, cancellation, or timeout ────────
    let ct = CancellationToken::new();
    spawn_shutdown_listener(ct.clone());

    match runner.run(&session, execution, ct).await {
        Ok(report) => {
            print_report(&report);
            Ok(report.exit_code())
        }
        Err(err) => {
            // The failed record is already on disk; point the caller at it.
            match runner.tracker().status(&session.id) {
                Ok(failed) => print_session(&failed),
                Err(_) => print_session(&session),
            }
            Err(err)
        }
    }
}

/// Re-execute this binary detached, adopting `session`.
fn detach(session: &Session) -> Result<()> {
    let exe = std::env::current_exe()
        .map_err(|err| AppError::Launch(format!("cannot locate launcher binary: {err}")))?;

    let args: Vec<String> = std::env::args()
        .skip(1)
        .filter(|arg| arg != "--background" && arg != "--executor")
        .collect();

    let child = std::process::Command::new(exe)
        .args(args)
        .arg("--executor")
        .arg("--session-id")
        .arg(&session.id)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| AppError::Launch(format!("failed to detach launcher: {err}")))?;

    info!(session_id = session.id, pid = child.id(), "launcher detached");
    Ok(())
}

fn print_session(session: &Session) {
    let body = serde_json::json!({
        "session_id": session.id,
        "status": session.status,
        "record": session.paths.record,
        "summary": session.paths.summary,
        "output": session.paths.output,
        "error_log": session.paths.error_log,
    });
    println!("{body}");
}

fn print_report(report: &SessionReport) {
    let session = &report.session;
    let summary = &report.summary;
    let body = serde_json::json!({
        "session_id": session.id,
        "status": session.status,
        "exit_code": session.exit_code,
        "summary": session.paths.summary,
        "output": session.paths.output,
        "error_log": session.paths.error_log,
        "agents": summary.agents.len(),
        "tasks": summary.tasks.len(),
        "memory": summary.memory.len(),
        "tool_calls": summary.tool_call_count,
        "errors": session.errors,
    });
    println!("{body}");
}

/// Cancel `ct` on SIGINT or SIGTERM.
///
/// Handlers are registered before returning, so a signal sent as soon as
/// the session is marked running is not lost.
fn spawn_shutdown_listener(ct: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::spawn(async move {
                    tokio::select! {
                        _ = sigint.recv() => {}
                        _ = sigterm.recv() => {}
                    }
                    info!("shutdown signal received");
                    ct.cancel();
                });
                return;
            }
            (Err(err), _) | (_, Err(err)) => {
                warn!(%err, "failed to register signal handlers, using ctrl-c only");
            }
        }
    }

    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "ctrl-c signal handler failed");
            return;
        }
        info!("shutdown signal received");
        ct.cancel();
    });
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
