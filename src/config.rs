//! Launcher configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Default bound on collaborator turns when the caller supplies none.
pub const DEFAULT_MAX_TURNS: u32 = 50;

fn default_host_cli() -> String {
    "claude".into()
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".swarm").join("sessions")
}

fn default_mcp_config() -> PathBuf {
    PathBuf::from(".mcp.json")
}

fn default_max_turns() -> u32 {
    DEFAULT_MAX_TURNS
}

fn default_termination_grace_seconds() -> u64 {
    5
}

/// Global configuration parsed from an optional `swarm.toml`.
///
/// Every field has a default, so an empty document is a valid
/// configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct GlobalConfig {
    /// Collaborator CLI binary (e.g., `claude`).
    #[serde(default = "default_host_cli")]
    pub host_cli: String,
    /// Arguments placed before the generated headless arguments.
    #[serde(default)]
    pub host_cli_args: Vec<String>,
    /// Directory the collaborator process starts in.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// Session artifact directory; relative paths resolve against `workspace_root`.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Collaborator descriptor path; relative paths resolve against `workspace_root`.
    #[serde(default = "default_mcp_config")]
    pub mcp_config: PathBuf,
    /// Max-turns bound applied to headless runs without an explicit value.
    #[serde(default = "default_max_turns")]
    pub default_max_turns: u32,
    /// Tool allow-list glob patterns applied when the caller passes none.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Model the collaborator falls back to when its primary is unavailable.
    #[serde(default)]
    pub fallback_model: Option<String>,
    /// Treat recognized CI environment variables as a headless signal.
    #[serde(default)]
    pub detect_ci: bool,
    /// Wall-clock bound per session; 0 means unbounded.
    #[serde(default)]
    pub session_timeout_seconds: u64,
    /// Time between SIGTERM and a hard kill when terminating the collaborator.
    #[serde(default = "default_termination_grace_seconds")]
    pub termination_grace_seconds: u64,
    /// Extra environment variables forwarded to the collaborator.
    #[serde(default)]
    pub passthrough_env: Vec<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            host_cli: default_host_cli(),
            host_cli_args: Vec::new(),
            workspace_root: default_workspace_root(),
            output_dir: default_output_dir(),
            mcp_config: default_mcp_config(),
            default_max_turns: DEFAULT_MAX_TURNS,
            allowed_tools: Vec::new(),
            fallback_model: None,
            detect_ci: false,
            session_timeout_seconds: 0,
            termination_grace_seconds: default_termination_grace_seconds(),
            passthrough_env: Vec::new(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise validate the defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if loading or validation fails.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => {
                let mut config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Absolute directory holding per-session artifacts.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.output_dir)
    }

    /// Absolute path of the collaborator descriptor.
    #[must_use]
    pub fn mcp_config_path(&self) -> PathBuf {
        self.resolve(&self.mcp_config)
    }

    /// Optional wall-clock bound per session.
    #[must_use]
    pub fn session_timeout(&self) -> Option<Duration> {
        (self.session_timeout_seconds > 0).then(|| Duration::from_secs(self.session_timeout_seconds))
    }

    /// Grace period between SIGTERM and a hard kill.
    #[must_use]
    pub fn termination_grace(&self) -> Duration {
        Duration::from_secs(self.termination_grace_seconds)
    }

    /// Resolve `path` against the workspace root unless already absolute.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.host_cli.trim().is_empty() {
            return Err(AppError::Config("host_cli must not be empty".into()));
        }

        if self.default_max_turns == 0 {
            return Err(AppError::Config(
                "default_max_turns must be greater than zero".into(),
            ));
        }

        for pattern in &self.allowed_tools {
            glob::Pattern::new(pattern).map_err(|err| {
                AppError::Config(format!("invalid allowed_tools pattern {pattern:?}: {err}"))
            })?;
        }

        let canonical_root = self
            .workspace_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("workspace_root invalid: {err}")))?;
        self.workspace_root = canonical_root;

        Ok(())
    }
}
