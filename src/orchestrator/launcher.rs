//! Collaborator process launcher.
//!
//! Translates an [`ExecutionConfig`] into the collaborator CLI's argument
//! surface and spawns it with:
//! - `kill_on_drop(true)` so an abandoned process is cleaned up.
//! - `env_clear()` plus an allowlist, so launcher secrets never reach the
//!   collaborator unless explicitly passed through.
//! - The task text delivered on stdin, which is closed afterwards.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{info, warn};

use crate::config::GlobalConfig;
use crate::models::execution::ExecutionConfig;
use crate::{AppError, Result};

// ── Environment allowlist ────────────────────────────────────────────────────

/// Environment variables inherited by the collaborator process.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    "ANTHROPIC_API_KEY",
    "ANTHROPIC_BASE_URL",
    "CLAUDE_CONFIG_DIR",
    "XDG_CONFIG_HOME",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// Variable carrying the session identifier into the collaborator.
pub const SESSION_ID_ENV: &str = "SWARM_SESSION_ID";

// ── Launcher ─────────────────────────────────────────────────────────────────

/// Spawns collaborator processes. Cheap to clone; holds no process state.
#[derive(Debug, Clone)]
pub struct Launcher {
    /// Collaborator binary.
    pub host_cli: String,
    /// Arguments placed before the generated ones.
    pub host_cli_args: Vec<String>,
    /// Working directory of the collaborator.
    pub workspace_root: PathBuf,
    /// Extra variables forwarded on top of [`ALLOWED_ENV_VARS`].
    pub passthrough_env: Vec<String>,
}

/// A running headless collaborator.
///
/// The caller owns `child` (it has `kill_on_drop(true)`) and must consume
/// `stdout`; `stderr` should be drained so the collaborator never blocks
/// on a full pipe.
#[derive(Debug)]
pub struct AgentProcess {
    /// Child handle.
    pub child: Child,
    /// Line-delimited JSON event stream.
    pub stdout: ChildStdout,
    /// Diagnostic output.
    pub stderr: ChildStderr,
    /// OS process id, if still known.
    pub pid: Option<u32>,
}

impl Launcher {
    /// Build a launcher from launcher configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            host_cli: config.host_cli.clone(),
            host_cli_args: config.host_cli_args.clone(),
            workspace_root: config.workspace_root.clone(),
            passthrough_env: config.passthrough_env.clone(),
        }
    }

    /// Arguments for a headless (print-mode, streaming) invocation.
    #[must_use]
    pub fn headless_args(&self, config: &ExecutionConfig, mcp_config: &Path) -> Vec<String> {
        let mut args = self.host_cli_args.clone();
        args.extend([
            "-p".to_owned(),
            "--output-format".to_owned(),
            config.output_format.as_arg().to_owned(),
            "--verbose".to_owned(),
            "--mcp-config".to_owned(),
            mcp_config.display().to_string(),
            "--max-turns".to_owned(),
            config.max_turns.get().to_string(),
        ]);
        if !config.allowed_tools.is_empty() {
            args.push("--allowedTools".to_owned());
            args.push(config.allowed_tools.join(","));
        }
        if let Some(model) = &config.fallback_model {
            args.push("--fallback-model".to_owned());
            args.push(model.clone());
        }
        args
    }

    /// Arguments for an interactive invocation; the task is the last argument.
    #[must_use]
    pub fn interactive_args(
        &self,
        config: &ExecutionConfig,
        mcp_config: &Path,
        task: &str,
    ) -> Vec<String> {
        let mut args = self.host_cli_args.clone();
        args.push("--mcp-config".to_owned());
        args.push(mcp_config.display().to_string());
        if !config.allowed_tools.is_empty() {
            args.push("--allowedTools".to_owned());
            args.push(config.allowed_tools.join(","));
        }
        if let Some(model) = &config.fallback_model {
            args.push("--fallback-model".to_owned());
            args.push(model.clone());
        }
        args.push(task.to_owned());
        args
    }

    /// Spawn a headless collaborator and hand it `task` on stdin.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Launch` if the process cannot be started or its
    /// stdio cannot be captured.
    pub fn spawn_headless(
        &self,
        config: &ExecutionConfig,
        session_id: &str,
        mcp_config: &Path,
        task: &str,
    ) -> Result<AgentProcess> {
        let mut cmd = self.base_command(session_id);
        cmd.args(self.headless_args(config, mcp_config))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| {
            AppError::Launch(format!("failed to spawn {}: {err}", self.host_cli))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Launch("failed to capture collaborator stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Launch("failed to capture collaborator stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Launch("failed to capture collaborator stderr".into()))?;

        let pid = child.id();
        info!(
            session_id,
            pid = pid.unwrap_or(0),
            host_cli = self.host_cli,
            "collaborator process spawned"
        );

        // Written from a task so a collaborator that never reads stdin
        // cannot block the launcher on a full pipe.
        let payload = task.to_owned();
        let sid = session_id.to_owned();
        tokio::spawn(async move {
            if let Err(err) = stdin.write_all(payload.as_bytes()).await {
                warn!(session_id = sid, %err, "failed to deliver task to collaborator stdin");
                return;
            }
            if let Err(err) = stdin.shutdown().await {
                warn!(session_id = sid, %err, "failed to close collaborator stdin");
            }
        });

        Ok(AgentProcess {
            child,
            stdout,
            stderr,
            pid,
        })
    }

    /// Spawn an interactive collaborator attached to the launcher's terminal.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Launch` if the process cannot be started.
    pub fn spawn_interactive(
        &self,
        config: &ExecutionConfig,
        session_id: &str,
        mcp_config: &Path,
        task: &str,
    ) -> Result<Child> {
        let mut cmd = self.base_command(session_id);
        cmd.args(self.interactive_args(config, mcp_config, task))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|err| {
            AppError::Launch(format!("failed to spawn {}: {err}", self.host_cli))
        })?;
        info!(
            session_id,
            pid = child.id().unwrap_or(0),
            "interactive collaborator spawned"
        );
        Ok(child)
    }

    fn base_command(&self, session_id: &str) -> Command {
        let mut cmd = Command::new(&self.host_cli);

        // Strip inherited environment, then inject only the allowlist.
        cmd.env_clear();
        let passthrough = self.passthrough_env.iter().map(String::as_str);
        for key in ALLOWED_ENV_VARS.iter().copied().chain(passthrough) {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }
        cmd.env(SESSION_ID_ENV, session_id);
        cmd.current_dir(&self.workspace_root);
        cmd
    }
}

// ── Termination ──────────────────────────────────────────────────────────────

/// Ask a process to stop with SIGTERM.
///
/// # Errors
///
/// Returns `AppError::Process` if the signal cannot be delivered.
#[cfg(unix)]
pub fn signal_terminate(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .map_err(|_| AppError::Process(format!("pid {pid} out of range")))?;
    kill(Pid::from_raw(raw), Signal::SIGTERM)
        .map_err(|err| AppError::Process(format!("failed to signal pid {pid}: {err}")))
}

/// Ask a process to stop. Unsupported off unix.
///
/// # Errors
///
/// Always returns `AppError::Process`.
#[cfg(not(unix))]
pub fn signal_terminate(pid: u32) -> Result<()> {
    Err(AppError::Process(format!(
        "graceful termination of pid {pid} is not supported on this platform"
    )))
}

/// Whether a process with `pid` still exists.
///
/// A process owned by another user counts as alive.
#[cfg(unix)]
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => matches!(kill(Pid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM)),
        _ => false,
    }
}

/// Whether a process with `pid` still exists. Always `true` off unix.
#[cfg(not(unix))]
#[must_use]
pub fn process_alive(_pid: u32) -> bool {
    true
}

/// Stop `child`: SIGTERM, wait up to `grace`, then kill.
///
/// Returns the exit status when one could be observed.
pub async fn terminate(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    if let Some(pid) = child.id() {
        if let Err(err) = signal_terminate(pid) {
            warn!(pid, %err, "graceful termination failed, killing");
        }
    }

    if let Ok(Ok(status)) = tokio::time::timeout(grace, child.wait()).await {
        return Some(status);
    }

    if let Err(err) = child.kill().await {
        warn!(%err, "failed to kill collaborator process");
        return None;
    }
    child.wait().await.ok()
}
