//! Session tracker — identifiers, artifact paths, and status records.
//!
//! Every artifact name embeds the session identifier, so concurrent
//! sessions sharing an output directory never collide. Status records are
//! rewritten atomically on each transition so external inspection always
//! reads a complete document.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::models::session::{Session, SessionError, SessionPaths, SessionStatus};
use crate::models::summary::OrchestrationSummary;
use crate::{AppError, Result};

/// File-name prefix shared by all session artifacts.
const FILE_PREFIX: &str = "swarm-";

/// Suffix of the status record file.
const RECORD_SUFFIX: &str = ".session.json";

/// Attempts at drawing an unused identifier before giving up.
const MAX_ID_ATTEMPTS: usize = 8;

/// Issues session identifiers and persists session state.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    output_dir: PathBuf,
    active: Arc<Mutex<HashMap<String, Session>>>,
}

impl SessionTracker {
    /// Construct a tracker rooted at `output_dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the directory cannot be created.
    pub fn new(output_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&output_dir).map_err(|err| {
            AppError::Config(format!(
                "failed to create output directory {}: {err}",
                output_dir.display()
            ))
        })?;
        Ok(Self {
            output_dir,
            active: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Attach to an existing output directory without creating anything.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `output_dir` is not a directory.
    pub fn open(output_dir: PathBuf) -> Result<Self> {
        if !output_dir.is_dir() {
            return Err(AppError::NotFound(format!(
                "no session output directory at {}",
                output_dir.display()
            )));
        }
        Ok(Self {
            output_dir,
            active: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Directory holding all session artifacts.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Deterministic artifact paths for `id`.
    #[must_use]
    pub fn paths(&self, id: &str) -> SessionPaths {
        let file = |suffix: &str| self.output_dir.join(format!("{FILE_PREFIX}{id}{suffix}"));
        SessionPaths {
            output: file(".jsonl"),
            error_log: file(".err"),
            summary: file(".summary.json"),
            record: file(RECORD_SUFFIX),
            mcp_config: file(".mcp.json"),
        }
    }

    /// Issue a fresh session in `created` state and persist its record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if no unused identifier could be drawn or the
    /// record cannot be written.
    pub fn create(&self, task: &str, headless: bool) -> Result<Session> {
        let mut active = self.lock()?;

        let id = (0..MAX_ID_ATTEMPTS)
            .map(|_| Session::generate_id())
            .find(|id| !active.contains_key(id) && !self.paths(id).record.exists())
            .ok_or_else(|| AppError::Io("could not allocate a unique session id".into()))?;

        let session = Session::new(id.clone(), task.to_owned(), headless, self.paths(&id));
        write_record(&session)?;
        active.insert(id, session.clone());
        drop(active);

        info!(session_id = session.id, headless, "session created");
        Ok(session)
    }

    /// Re-attach to a `created` session issued by another launcher process.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no record exists and `AppError::Config`
    /// if the session has already left `created`.
    pub fn adopt(&self, id: &str) -> Result<Session> {
        let mut session = read_record(&self.paths(id).record)?;
        if session.status != SessionStatus::Created {
            return Err(AppError::Config(format!(
                "session {id} is {:?}, expected created",
                session.status
            )));
        }
        session.launcher_pid = std::process::id();
        session.updated_at = Utc::now();
        write_record(&session)?;
        self.lock()?.insert(id.to_owned(), session.clone());
        debug!(session_id = id, "session adopted");
        Ok(session)
    }

    /// Transition `created → running`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown session and
    /// `AppError::Config` for an illegal transition.
    pub fn mark_running(&self, id: &str, agent_pid: Option<u32>) -> Result<Session> {
        self.update(id, |session| {
            transition(session, SessionStatus::Running)?;
            session.agent_pid = agent_pid;
            Ok(())
        })
    }

    /// Transition to a terminal status, writing the summary first.
    ///
    /// The summary file and final record are written even when the
    /// session failed, so every outcome leaves a diagnosable artifact.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown session,
    /// `AppError::Config` for an illegal transition, and `AppError::Io` if
    /// an artifact cannot be written.
    pub fn finish(
        &self,
        id: &str,
        status: SessionStatus,
        exit_code: Option<i32>,
        errors: Vec<SessionError>,
        summary: &OrchestrationSummary,
    ) -> Result<Session> {
        if !status.is_terminal() {
            return Err(AppError::Config(format!(
                "{status:?} is not a terminal session status"
            )));
        }

        let mut session = self.current(id)?;
        transition(&mut session, status)?;
        write_atomic(&session.paths.summary, summary.to_json()?.as_bytes())?;

        session.exit_code = exit_code;
        session.agent_pid = None;
        session.errors.extend(errors);
        write_record(&session)?;

        self.lock()?.remove(id);
        info!(
            session_id = id,
            status = ?session.status,
            agents = summary.agents.len(),
            tasks = summary.tasks.len(),
            memory = summary.memory.len(),
            errors = session.errors.len(),
            "session finished"
        );
        Ok(session)
    }

    /// Current state of a session, in memory if active, else from disk.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session is unknown.
    pub fn status(&self, id: &str) -> Result<Session> {
        self.current(id)
    }

    /// All recorded sessions, newest first.
    ///
    /// Unreadable records are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the output directory cannot be listed.
    pub fn list(&self) -> Result<Vec<Session>> {
        let entries = std::fs::read_dir(&self.output_dir).map_err(|err| {
            AppError::Io(format!(
                "failed to list {}: {err}",
                self.output_dir.display()
            ))
        })?;

        let mut sessions: Vec<Session> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(FILE_PREFIX) && name.ends_with(RECORD_SUFFIX))
            })
            .filter_map(|path| match read_record(&path) {
                Ok(session) => Some(session),
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping unreadable session record");
                    None
                }
            })
            .collect();

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    /// Load the finalized summary of a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no summary has been written.
    pub fn summary(&self, id: &str) -> Result<OrchestrationSummary> {
        let path = self.paths(id).summary;
        let raw = std::fs::read_to_string(&path)
            .map_err(|_| AppError::NotFound(format!("no summary for session {id}")))?;
        serde_json::from_str(&raw)
            .map_err(|err| AppError::Io(format!("corrupt summary {}: {err}", path.display())))
    }

    fn current(&self, id: &str) -> Result<Session> {
        if let Some(session) = self.lock()?.get(id) {
            return Ok(session.clone());
        }
        read_record(&self.paths(id).record)
    }

    fn update<F>(&self, id: &str, apply: F) -> Result<Session>
    where
        F: FnOnce(&mut Session) -> Result<()>,
    {
        let mut active = self.lock()?;
        let session = active
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("session {id} is not active")))?;
        apply(session)?;
        write_record(session)?;
        Ok(session.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Session>>> {
        self.active
            .lock()
            .map_err(|_| AppError::Io("session tracker mutex poisoned".into()))
    }
}

fn transition(session: &mut Session, next: SessionStatus) -> Result<()> {
    if !session.can_transition_to(next) {
        return Err(AppError::Config(format!(
            "session {} cannot move from {:?} to {next:?}",
            session.id, session.status
        )));
    }
    session.status = next;
    session.updated_at = Utc::now();
    Ok(())
}

fn read_record(path: &Path) -> Result<Session> {
    let raw = std::fs::read_to_string(path)
        .map_err(|_| AppError::NotFound(format!("no session record at {}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|err| AppError::Io(format!("corrupt session record {}: {err}", path.display())))
}

fn write_record(session: &Session) -> Result<()> {
    let body = serde_json::to_vec_pretty(session)
        .map_err(|err| AppError::Io(format!("failed to serialize session: {err}")))?;
    write_atomic(&session.paths.record, &body)
}

/// Write to a temporary file beside `path`, then rename over it.
fn write_atomic(path: &Path, body: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| AppError::Io("artifact path has no parent directory".into()))?;
    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|err| AppError::Io(format!("failed to create temporary file: {err}")))?;
    tmp.write_all(body)
        .map_err(|err| AppError::Io(format!("failed to write temporary file: {err}")))?;
    tmp.persist(path)
        .map_err(|err| AppError::Io(format!("failed to persist {}: {err}", path.display())))?;
    Ok(())
}
