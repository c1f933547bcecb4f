//! Collaborator-process descriptor (`.mcp.json`).
//!
//! The descriptor maps collaborator-server names to the command that
//! starts them over stdio. It is consumed from the workspace, validated,
//! and written back out per session so every collaborator process reads
//! its own immutable copy.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::{AppError, Result};

/// Key wrapping the server map in the collaborator's native layout.
const SERVERS_KEY: &str = "mcpServers";

/// Transport used to reach a collaborator server.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransport {
    /// Child process speaking JSON-RPC over stdin/stdout.
    #[default]
    Stdio,
}

/// One collaborator server entry.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct McpServer {
    /// Executable that starts the server.
    pub command: String,
    /// Ordered arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Transport; only `stdio` is supported.
    #[serde(default, rename = "type")]
    pub transport: McpTransport,
    /// Extra environment for the server process.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Fields this launcher does not interpret (`cwd`, `timeout`, ...),
    /// carried through to the per-session copy untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Validated set of collaborator servers.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct McpDescriptor {
    /// Servers keyed by name, in name order.
    #[serde(rename = "mcpServers")]
    pub servers: BTreeMap<String, McpServer>,
}

impl McpDescriptor {
    /// Load and validate a descriptor from disk.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file is missing, unreadable, or
    /// malformed, or if validation fails.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::Config(format!(
                "cannot read mcp descriptor {}: {err}",
                path.display()
            ))
        })?;
        Self::from_json_str(&raw).map_err(|err| match err {
            AppError::Config(msg) => AppError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Parse and validate a descriptor.
    ///
    /// Accepts either `{"mcpServers": {...}}` or the bare server map.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the JSON is malformed or validation fails.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let mut value: Value = serde_json::from_str(raw)
            .map_err(|err| AppError::Config(format!("malformed mcp descriptor: {err}")))?;

        let servers_value = if value.get(SERVERS_KEY).is_some() {
            value[SERVERS_KEY].take()
        } else {
            value
        };

        let servers: BTreeMap<String, McpServer> = serde_json::from_value(servers_value)
            .map_err(|err| AppError::Config(format!("malformed mcp descriptor: {err}")))?;

        let descriptor = Self { servers };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Default allow-list: every tool of every configured server.
    #[must_use]
    pub fn default_tool_patterns(&self) -> Vec<String> {
        self.servers
            .keys()
            .map(|name| format!("mcp__{name}__*"))
            .collect()
    }

    /// Write the descriptor atomically to `path` in the native layout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory is missing or the write fails.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| AppError::Io("descriptor path has no parent directory".into()))?;
        let body = serde_json::to_vec_pretty(self)
            .map_err(|err| AppError::Io(format!("failed to serialize mcp descriptor: {err}")))?;

        let mut tmp = NamedTempFile::new_in(parent)
            .map_err(|err| AppError::Io(format!("failed to create temporary file: {err}")))?;
        tmp.write_all(&body)
            .map_err(|err| AppError::Io(format!("failed to write temporary file: {err}")))?;
        tmp.persist(path).map_err(|err| {
            AppError::Io(format!(
                "failed to persist mcp descriptor to {}: {err}",
                path.display()
            ))
        })?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(AppError::Config(
                "mcp descriptor defines no servers".into(),
            ));
        }

        for (name, server) in &self.servers {
            if name.trim().is_empty() {
                return Err(AppError::Config("mcp server name must not be empty".into()));
            }
            if server.command.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "mcp server {name:?} has an empty command"
                )));
            }
        }

        Ok(())
    }
}
