//! Collaborator invocation settings.

use std::num::NonZeroU32;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::mcp::descriptor::McpDescriptor;

/// Output format requested from the collaborator.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Human-readable text, attached to the terminal.
    #[default]
    Text,
    /// One JSON object per line.
    StreamJson,
}

impl OutputFormat {
    /// `true` for formats the stream parser can consume.
    #[must_use]
    pub fn is_machine_readable(self) -> bool {
        matches!(self, Self::StreamJson)
    }

    /// Value passed to the collaborator's `--output-format`.
    #[must_use]
    pub fn as_arg(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::StreamJson => "stream-json",
        }
    }
}

/// Fully resolved configuration for one collaborator invocation.
///
/// Built by [`crate::orchestrator::builder::build_execution_config`] and
/// moved into the runner, which owns it for the life of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Headless decision.
    pub headless: bool,
    /// Tool-name glob patterns the collaborator may call.
    pub allowed_tools: Vec<String>,
    /// Bound on collaborator turns.
    pub max_turns: NonZeroU32,
    /// Optional fallback model identifier.
    pub fallback_model: Option<String>,
    /// Output format selector.
    pub output_format: OutputFormat,
    /// Validated collaborator-server descriptor.
    pub mcp: McpDescriptor,
    /// Where the descriptor was loaded from.
    pub mcp_source: PathBuf,
}
