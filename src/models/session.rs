//! Session model and lifecycle helpers.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppError;

/// Lifecycle status for a launcher session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Identifier issued; collaborator not yet spawned.
    Created,
    /// Collaborator process is running.
    Running,
    /// Collaborator finished and produced orchestration output.
    Complete,
    /// Launch, process, cancellation, or empty-output failure.
    Failed,
}

impl SessionStatus {
    /// `true` for `complete` and `failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Process exit code reported for this status.
    #[must_use]
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Complete | Self::Created | Self::Running => 0,
            Self::Failed => 1,
        }
    }
}

/// Category of an error recorded on a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing configuration.
    Configuration,
    /// Collaborator could not be started.
    Launch,
    /// Undecodable output line.
    Parse,
    /// Collaborator exited unsuccessfully.
    Process,
    /// Explicit or timeout-triggered termination.
    Cancelled,
    /// Collaborator exited cleanly but produced no orchestration output.
    EmptyOutput,
}

impl From<&AppError> for ErrorKind {
    fn from(err: &AppError) -> Self {
        match err {
            AppError::Config(_) => Self::Configuration,
            AppError::Launch(_) => Self::Launch,
            AppError::Parse(_) => Self::Parse,
            AppError::Cancelled(_) => Self::Cancelled,
            AppError::Process(_) | AppError::Io(_) | AppError::NotFound(_) => Self::Process,
        }
    }
}

/// An error accumulated on a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionError {
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
}

impl SessionError {
    /// Construct an error record.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&AppError> for SessionError {
    fn from(err: &AppError) -> Self {
        Self::new(ErrorKind::from(err), err.to_string())
    }
}

/// Per-session artifact paths, all partitioned by session identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionPaths {
    /// Raw collaborator stream, one JSON object per line.
    pub output: PathBuf,
    /// Collaborator stderr.
    pub error_log: PathBuf,
    /// Finalized orchestration summary.
    pub summary: PathBuf,
    /// Session status record.
    pub record: PathBuf,
    /// Descriptor copy handed to the collaborator.
    pub mcp_config: PathBuf,
}

/// One tracked launcher invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// Unique 128-bit identifier rendered as 32 hex characters.
    pub id: String,
    /// Task text handed to the collaborator.
    pub task: String,
    /// Whether the collaborator runs headless.
    pub headless: bool,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last transition timestamp.
    pub updated_at: DateTime<Utc>,
    /// Artifact locations.
    pub paths: SessionPaths,
    /// Launcher process id, for external cancellation.
    pub launcher_pid: u32,
    /// Collaborator process id while running.
    pub agent_pid: Option<u32>,
    /// Collaborator exit code, once known.
    pub exit_code: Option<i32>,
    /// Accumulated non-fatal and terminal errors.
    pub errors: Vec<SessionError>,
}

impl Session {
    /// Generate a fresh session identifier.
    #[must_use]
    pub fn generate_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Construct a session in `created` state.
    #[must_use]
    pub fn new(id: String, task: String, headless: bool, paths: SessionPaths) -> Self {
        let now = Utc::now();
        Self {
            id,
            task,
            headless,
            status: SessionStatus::Created,
            created_at: now,
            updated_at: now,
            paths,
            launcher_pid: std::process::id(),
            agent_pid: None,
            exit_code: None,
            errors: Vec::new(),
        }
    }

    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self.status, next),
            (
                SessionStatus::Created,
                SessionStatus::Running | SessionStatus::Failed
            ) | (
                SessionStatus::Running,
                SessionStatus::Complete | SessionStatus::Failed
            )
        )
    }
}
