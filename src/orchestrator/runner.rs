//! Session runner — the producer/consumer pipeline for one session.
//!
//! The collaborator process produces stream lines; a reader task frames
//! and classifies them and pushes them through a bounded channel; the
//! runner folds them into the summary as they arrive. Memory use is
//! bounded by the summary, not by the collaborator's total output.
//!
//! Cancellation (explicit or timeout) signals the collaborator, stops the
//! reader, finalizes whatever was accumulated, and marks the session
//! `failed` with a `cancelled` error.

use std::process::ExitStatus;
use std::time::Duration;

use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, BufWriter};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::models::execution::ExecutionConfig;
use crate::models::session::{ErrorKind, Session, SessionError, SessionStatus};
use crate::models::summary::OrchestrationSummary;
use crate::orchestrator::launcher::{self, Launcher};
use crate::orchestrator::reconstructor::Reconstructor;
use crate::orchestrator::session_tracker::SessionTracker;
use crate::stream::reader::run_reader;
use crate::Result;

/// Capacity of the reader → reconstructor channel.
pub const STREAM_CHANNEL_CAPACITY: usize = 256;

/// Final state of a session run.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    /// Session after its terminal transition.
    pub session: Session,
    /// Finalized summary.
    pub summary: OrchestrationSummary,
}

impl SessionReport {
    /// Process exit code for this outcome: 0 only for `complete`.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        self.session.status.exit_code()
    }
}

/// Why a session stopped before the collaborator exited on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Cancelled,
    TimedOut(Duration),
}

impl StopReason {
    fn describe(self) -> String {
        match self {
            Self::Cancelled => "session cancelled".to_owned(),
            Self::TimedOut(limit) => format!("session exceeded its {limit:?} time limit"),
        }
    }
}

/// Runs sessions against one launcher and tracker.
#[derive(Debug, Clone)]
pub struct SessionRunner {
    tracker: SessionTracker,
    launcher: Launcher,
    timeout: Option<Duration>,
    grace: Duration,
}

impl SessionRunner {
    /// Construct a runner with no timeout and a five-second termination grace.
    #[must_use]
    pub fn new(tracker: SessionTracker, launcher: Launcher) -> Self {
        Self {
            tracker,
            launcher,
            timeout: None,
            grace: Duration::from_secs(5),
        }
    }

    /// Build tracker, launcher, and limits from launcher configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the output directory cannot be created.
    pub fn from_config(config: &GlobalConfig) -> Result<Self> {
        let tracker = SessionTracker::new(config.output_dir())?;
        Ok(Self::new(tracker, Launcher::from_config(config))
            .with_timeout(config.session_timeout())
            .with_termination_grace(config.termination_grace()))
    }

    /// Bound every session by a wall-clock limit.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Time between SIGTERM and a hard kill on cancellation.
    #[must_use]
    pub fn with_termination_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Session tracker shared by this runner.
    #[must_use]
    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Run `session` (which must be `created`) to a terminal state.
    ///
    /// Process failures, parse errors, empty output, and cancellation are
    /// reported through the returned [`SessionReport`]; the partial summary
    /// is always kept. A stopped session records whatever exit code the
    /// collaborator produced while being terminated.
    ///
    /// Interactive sessions have no output stream to reconstruct, so they
    /// are judged on exit status alone: a clean exit completes with an
    /// empty summary.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Launch` if the collaborator cannot be started and
    /// `AppError::Io` if the descriptor copy cannot be written. In both
    /// cases the session has already been recorded as `failed`. Tracker
    /// persistence failures are also returned.
    pub async fn run(
        &self,
        session: &Session,
        config: ExecutionConfig,
        cancel: CancellationToken,
    ) -> Result<SessionReport> {
        let span = info_span!("session", session_id = %session.id, headless = config.headless);
        self.run_inner(session, config, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        session: &Session,
        config: ExecutionConfig,
        cancel: CancellationToken,
    ) -> Result<SessionReport> {
        let paths = &session.paths;

        if let Err(err) = config.mcp.write_to(&paths.mcp_config) {
            self.fail_before_start(session, &err);
            return Err(err);
        }

        if !config.headless {
            return self.run_interactive(session, &config, cancel).await;
        }

        let process = match self.launcher.spawn_headless(
            &config,
            &session.id,
            &paths.mcp_config,
            &session.task,
        ) {
            Ok(process) => process,
            Err(err) => {
                self.fail_before_start(session, &err);
                return Err(err);
            }
        };
        let mut child = process.child;
        self.tracker.mark_running(&session.id, process.pid)?;
        info!(session_id = session.id, pid = process.pid.unwrap_or(0), "session running");

        let capture = open_capture(&session.id, &paths.output).await;
        let stderr_task = tokio::spawn(drain_stderr(
            session.id.clone(),
            process.stderr,
            paths.error_log.clone(),
        ));

        let (event_tx, mut event_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let reader_cancel = cancel.child_token();
        let reader_task = tokio::spawn(run_reader(
            session.id.clone(),
            process.stdout,
            capture,
            event_tx,
            reader_cancel.clone(),
        ));

        let deadline = self.timeout.map(|limit| (Instant::now() + limit, limit));
        let mut reconstructor = Reconstructor::new(session.id.clone());

        let mut stop = loop {
            tokio::select! {
                biased;

                reason = stop_signal(&cancel, deadline) => break Some(reason),

                message = event_rx.recv() => match message {
                    Some(message) => reconstructor.apply(message),
                    None => break None,
                },
            }
        };

        let mut errors = Vec::new();
        let mut exit_status = None;

        if stop.is_none() {
            tokio::select! {
                biased;

                reason = stop_signal(&cancel, deadline) => stop = Some(reason),

                status = child.wait() => match status {
                    Ok(status) => exit_status = Some(status),
                    Err(err) => errors.push(SessionError::new(
                        ErrorKind::Process,
                        format!("failed to wait on collaborator: {err}"),
                    )),
                },
            }
        }

        if let Some(reason) = stop {
            warn!(session_id = session.id, reason = %reason.describe(), "stopping collaborator");
            reader_cancel.cancel();
            drop(event_rx);
            exit_status = launcher::terminate(&mut child, self.grace).await;
            errors.push(SessionError::new(ErrorKind::Cancelled, reason.describe()));
        }

        match reader_task.await {
            Ok(Ok(stats)) => debug!(
                session_id = session.id,
                lines = stats.lines,
                events = stats.events,
                malformed = stats.malformed,
                "stream reader finished"
            ),
            Ok(Err(err)) => errors.push(SessionError::from(&err)),
            Err(err) => warn!(session_id = session.id, %err, "stream reader task failed"),
        }

        match tokio::time::timeout(self.grace, stderr_task).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(session_id = session.id, %err, "stderr drain task failed"),
            Err(_) => warn!(session_id = session.id, "stderr drain did not finish in time"),
        }

        let summary = reconstructor.finalize();
        errors.extend(summary.parse_errors.iter().map(|failure| {
            SessionError::new(
                ErrorKind::Parse,
                format!("line {}: {}", failure.line, failure.message),
            )
        }));

        let status = classify_outcome(stop.is_some(), exit_status, &summary, &mut errors);
        let exit_code = exit_status.and_then(|status| status.code());
        let session = self
            .tracker
            .finish(&session.id, status, exit_code, errors, &summary)?;

        Ok(SessionReport { session, summary })
    }

    async fn run_interactive(
        &self,
        session: &Session,
        config: &ExecutionConfig,
        cancel: CancellationToken,
    ) -> Result<SessionReport> {
        let mut child = match self.launcher.spawn_interactive(
            config,
            &session.id,
            &session.paths.mcp_config,
            &session.task,
        ) {
            Ok(child) => child,
            Err(err) => {
                self.fail_before_start(session, &err);
                return Err(err);
            }
        };
        self.tracker.mark_running(&session.id, child.id())?;

        let deadline = self.timeout.map(|limit| (Instant::now() + limit, limit));
        let mut errors = Vec::new();

        let (status, exit_status) = tokio::select! {
            biased;

            reason = stop_signal(&cancel, deadline) => {
                let observed = launcher::terminate(&mut child, self.grace).await;
                errors.push(SessionError::new(ErrorKind::Cancelled, reason.describe()));
                (SessionStatus::Failed, observed)
            }

            status = child.wait() => interactive_outcome(status, &mut errors),
        };

        let mut summary = OrchestrationSummary::default();
        summary.finalize();
        let exit_code = exit_status.and_then(|status: ExitStatus| status.code());
        let session = self
            .tracker
            .finish(&session.id, status, exit_code, errors, &summary)?;
        Ok(SessionReport { session, summary })
    }

    /// Record a failure that happened before the collaborator was running.
    fn fail_before_start(&self, session: &Session, err: &crate::AppError) {
        error!(session_id = session.id, %err, "session failed before start");
        let mut summary = OrchestrationSummary::default();
        summary.finalize();
        if let Err(persist_err) = self.tracker.finish(
            &session.id,
            SessionStatus::Failed,
            None,
            vec![SessionError::from(err)],
            &summary,
        ) {
            error!(session_id = session.id, %persist_err, "failed to record launch failure");
        }
    }
}

/// Resolve once the session is cancelled or its deadline passes.
async fn stop_signal(
    cancel: &CancellationToken,
    deadline: Option<(Instant, Duration)>,
) -> StopReason {
    match deadline {
        Some((at, limit)) => tokio::select! {
            () = cancel.cancelled() => StopReason::Cancelled,
            () = tokio::time::sleep_until(at) => StopReason::TimedOut(limit),
        },
        None => {
            cancel.cancelled().await;
            StopReason::Cancelled
        }
    }
}

/// Decide the terminal status of a headless session.
///
/// A clean exit with no agents, tasks, or memory writes is a failure: the
/// collaborator ran but did no orchestration work.
fn classify_outcome(
    stopped: bool,
    exit_status: Option<ExitStatus>,
    summary: &OrchestrationSummary,
    errors: &mut Vec<SessionError>,
) -> SessionStatus {
    if stopped {
        return SessionStatus::Failed;
    }
    match exit_status {
        Some(status) if status.success() => {
            if summary.is_empty() {
                errors.push(SessionError::new(
                    ErrorKind::EmptyOutput,
                    "collaborator exited successfully but recorded no agents, tasks, or memory",
                ));
                SessionStatus::Failed
            } else {
                SessionStatus::Complete
            }
        }
        Some(status) => {
            errors.push(SessionError::new(
                ErrorKind::Process,
                format!("collaborator {}", describe_exit(status)),
            ));
            SessionStatus::Failed
        }
        None => SessionStatus::Failed,
    }
}

fn interactive_outcome(
    status: std::io::Result<ExitStatus>,
    errors: &mut Vec<SessionError>,
) -> (SessionStatus, Option<ExitStatus>) {
    match status {
        Ok(status) if status.success() => (SessionStatus::Complete, Some(status)),
        Ok(status) => {
            errors.push(SessionError::new(
                ErrorKind::Process,
                format!("collaborator {}", describe_exit(status)),
            ));
            (SessionStatus::Failed, Some(status))
        }
        Err(err) => {
            errors.push(SessionError::new(
                ErrorKind::Process,
                format!("failed to wait on collaborator: {err}"),
            ));
            (SessionStatus::Failed, None)
        }
    }
}

fn describe_exit(status: ExitStatus) -> String {
    status.code().map_or_else(
        || "terminated by signal".to_owned(),
        |code| format!("exited with code {code}"),
    )
}

/// Open the stream capture file; fall back to discarding on failure.
async fn open_capture(
    session_id: &str,
    path: &std::path::Path,
) -> Box<dyn AsyncWrite + Unpin + Send> {
    match File::create(path).await {
        Ok(file) => Box::new(BufWriter::new(file)),
        Err(err) => {
            warn!(session_id, path = %path.display(), %err, "cannot create stream output file");
            Box::new(tokio::io::sink())
        }
    }
}

/// Copy collaborator stderr to the session error log.
async fn drain_stderr<R>(session_id: String, mut stderr: R, path: std::path::PathBuf)
where
    R: AsyncRead + Unpin,
{
    let result = match File::create(&path).await {
        Ok(file) => {
            let mut writer = BufWriter::new(file);
            let copied = tokio::io::copy(&mut stderr, &mut writer).await;
            match tokio::io::AsyncWriteExt::flush(&mut writer).await {
                Ok(()) => copied,
                Err(err) => Err(err),
            }
        }
        Err(err) => {
            warn!(session_id, path = %path.display(), %err, "cannot create error log, discarding stderr");
            tokio::io::copy(&mut stderr, &mut tokio::io::sink()).await
        }
    };

    match result {
        Ok(bytes) => debug!(session_id, bytes, "stderr drained"),
        Err(err) => warn!(session_id, %err, "stderr drain failed"),
    }
}
