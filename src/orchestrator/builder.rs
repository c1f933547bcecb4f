//! Execution-config builder.
//!
//! Combines the headless decision, caller options, and launcher defaults
//! into an [`ExecutionConfig`]. A missing or malformed collaborator
//! descriptor is always an error: falling back silently would start the
//! collaborator without its tools.

use std::num::NonZeroU32;
use std::path::PathBuf;

use tracing::{debug, info_span};

use crate::config::GlobalConfig;
use crate::mcp::descriptor::McpDescriptor;
use crate::models::execution::{ExecutionConfig, OutputFormat};
use crate::{AppError, Result};

/// Caller-supplied options for one invocation. `None` means "use the default".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Tool allow-list patterns.
    pub allowed_tools: Vec<String>,
    /// Max-turns bound.
    pub max_turns: Option<u32>,
    /// Fallback model identifier.
    pub fallback_model: Option<String>,
    /// Requested output format.
    pub output_format: Option<OutputFormat>,
    /// Descriptor path overriding the configured one.
    pub mcp_config: Option<PathBuf>,
}

/// Build the configuration for one collaborator invocation.
///
/// When `headless` is set the output format is forced to
/// [`OutputFormat::StreamJson`], and the allow-list defaults to every tool
/// of every descriptor server when neither the caller nor the config
/// supplies one.
///
/// # Errors
///
/// Returns `AppError::Config` if the descriptor cannot be loaded or is
/// invalid, if `max_turns` is zero, or if an allow-list pattern is not a
/// valid glob.
pub fn build_execution_config(
    headless: bool,
    options: &LaunchOptions,
    config: &GlobalConfig,
) -> Result<ExecutionConfig> {
    let span = info_span!("build_execution_config", headless);
    let _guard = span.enter();

    let mcp_source = options
        .mcp_config
        .as_deref()
        .map_or_else(|| config.mcp_config_path(), |path| config.resolve(path));
    let mcp = McpDescriptor::load(&mcp_source)?;

    let max_turns = options.max_turns.unwrap_or(config.default_max_turns);
    let max_turns = NonZeroU32::new(max_turns)
        .ok_or_else(|| AppError::Config("max_turns must be greater than zero".into()))?;

    let output_format = if headless {
        OutputFormat::StreamJson
    } else {
        options.output_format.unwrap_or_default()
    };

    let mut allowed_tools = if options.allowed_tools.is_empty() {
        config.allowed_tools.clone()
    } else {
        options.allowed_tools.clone()
    };
    if allowed_tools.is_empty() && headless {
        allowed_tools = mcp.default_tool_patterns();
    }
    for pattern in &allowed_tools {
        glob::Pattern::new(pattern).map_err(|err| {
            AppError::Config(format!("invalid allowed tool pattern {pattern:?}: {err}"))
        })?;
    }

    let fallback_model = options
        .fallback_model
        .clone()
        .or_else(|| config.fallback_model.clone());

    debug!(
        servers = mcp.servers.len(),
        max_turns = max_turns.get(),
        tools = allowed_tools.len(),
        "execution config built"
    );

    Ok(ExecutionConfig {
        headless,
        allowed_tools,
        max_turns,
        fallback_model,
        output_format,
        mcp,
        mcp_source,
    })
}
