//! Error types shared across the launcher.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all launcher failure modes.
///
/// `Config` and `Launch` are fatal and abort an invocation before the
/// session reaches `running`. The remaining variants are recorded on the
/// session and never stop consumption of further stream events.
#[derive(Debug)]
pub enum AppError {
    /// Launcher configuration or collaborator descriptor is missing or invalid.
    Config(String),
    /// The collaborator process could not be started.
    Launch(String),
    /// One line of collaborator output could not be decoded.
    Parse(String),
    /// The collaborator process exited unsuccessfully.
    Process(String),
    /// The session was terminated before natural completion.
    Cancelled(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Requested session does not exist.
    NotFound(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Launch(msg) => write!(f, "launch: {msg}"),
            Self::Parse(msg) => write!(f, "parse: {msg}"),
            Self::Process(msg) => write!(f, "process: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
