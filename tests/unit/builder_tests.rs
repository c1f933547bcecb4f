//! Unit tests for execution-config building.

use std::path::Path;

use headless_swarm::config::GlobalConfig;
use headless_swarm::models::execution::OutputFormat;
use headless_swarm::orchestrator::builder::{build_execution_config, LaunchOptions};
use headless_swarm::AppError;

const DESCRIPTOR: &str = r#"{ "mcpServers": { "claude-flow": { "command": "npx", "args": ["claude-flow", "mcp", "start"] } } }"#;

fn config_in(root: &Path) -> GlobalConfig {
    GlobalConfig {
        workspace_root: root.canonicalize().expect("canonical"),
        ..GlobalConfig::default()
    }
}

fn workspace_with_descriptor() -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join(".mcp.json"), DESCRIPTOR).expect("write descriptor");
    temp
}

#[test]
fn headless_forces_stream_json_and_default_limits() {
    let temp = workspace_with_descriptor();
    let options = LaunchOptions {
        output_format: Some(OutputFormat::Text),
        ..LaunchOptions::default()
    };

    let execution =
        build_execution_config(true, &options, &config_in(temp.path())).expect("built");

    assert!(execution.headless);
    assert_eq!(execution.output_format, OutputFormat::StreamJson);
    assert_eq!(execution.max_turns.get(), 50);
    assert_eq!(execution.allowed_tools, vec!["mcp__claude-flow__*"]);
    assert!(execution.mcp.servers.contains_key("claude-flow"));
    assert!(execution.mcp_source.ends_with(".mcp.json"));
}

#[test]
fn interactive_keeps_requested_format_and_empty_allow_list() {
    let temp = workspace_with_descriptor();
    let execution = build_execution_config(false, &LaunchOptions::default(), &config_in(temp.path()))
        .expect("built");

    assert!(!execution.headless);
    assert_eq!(execution.output_format, OutputFormat::Text);
    assert!(execution.allowed_tools.is_empty());
}

#[test]
fn explicit_options_take_precedence() {
    let temp = workspace_with_descriptor();
    let mut config = config_in(temp.path());
    config.allowed_tools = vec!["mcp__claude-flow__agent_*".into()];
    config.fallback_model = Some("config-model".into());

    let options = LaunchOptions {
        allowed_tools: vec!["mcp__claude-flow__task_*".into()],
        max_turns: Some(7),
        fallback_model: Some("cli-model".into()),
        ..LaunchOptions::default()
    };
    let execution = build_execution_config(true, &options, &config).expect("built");

    assert_eq!(execution.allowed_tools, vec!["mcp__claude-flow__task_*"]);
    assert_eq!(execution.max_turns.get(), 7);
    assert_eq!(execution.fallback_model.as_deref(), Some("cli-model"));
}

#[test]
fn config_allow_list_is_used_when_caller_passes_none() {
    let temp = workspace_with_descriptor();
    let mut config = config_in(temp.path());
    config.allowed_tools = vec!["mcp__claude-flow__memory_*".into()];
    config.fallback_model = Some("config-model".into());

    let execution = build_execution_config(true, &LaunchOptions::default(), &config).expect("built");
    assert_eq!(execution.allowed_tools, vec!["mcp__claude-flow__memory_*"]);
    assert_eq!(execution.fallback_model.as_deref(), Some("config-model"));
}

#[test]
fn zero_max_turns_is_config_error() {
    let temp = workspace_with_descriptor();
    let options = LaunchOptions {
        max_turns: Some(0),
        ..LaunchOptions::default()
    };
    let result = build_execution_config(true, &options, &config_in(temp.path()));
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn invalid_allow_list_pattern_is_config_error() {
    let temp = workspace_with_descriptor();
    let options = LaunchOptions {
        allowed_tools: vec!["mcp__[".into()],
        ..LaunchOptions::default()
    };
    let result = build_execution_config(true, &options, &config_in(temp.path()));
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn missing_descriptor_is_config_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let result = build_execution_config(true, &LaunchOptions::default(), &config_in(temp.path()));
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn malformed_descriptor_is_config_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join(".mcp.json"), "{ \"mcpServers\": ").expect("write");
    let result = build_execution_config(true, &LaunchOptions::default(), &config_in(temp.path()));
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn descriptor_override_resolves_against_workspace() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir(temp.path().join("conf")).expect("mkdir");
    std::fs::write(temp.path().join("conf").join("swarm.mcp.json"), DESCRIPTOR).expect("write");

    let options = LaunchOptions {
        mcp_config: Some("conf/swarm.mcp.json".into()),
        ..LaunchOptions::default()
    };
    let execution =
        build_execution_config(true, &options, &config_in(temp.path())).expect("built");
    assert!(execution.mcp_source.ends_with("conf/swarm.mcp.json"));
}
