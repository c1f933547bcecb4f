//! Shared helpers for runner-level integration tests.
//!
//! The collaborator is played by `sh -c <script>`: the generated CLI
//! arguments land in `$0…$n` and are ignored, so each test controls the
//! stream, the exit code, and the timing through the script alone.

use std::path::{Path, PathBuf};
use std::time::Duration;

use headless_swarm::config::GlobalConfig;
use headless_swarm::models::execution::ExecutionConfig;
use headless_swarm::models::session::Session;
use headless_swarm::orchestrator::builder::{build_execution_config, LaunchOptions};
use headless_swarm::orchestrator::runner::SessionRunner;

/// Descriptor written into every test workspace.
pub const DESCRIPTOR: &str = r#"{
  "mcpServers": {
    "claude-flow": { "command": "npx", "args": ["claude-flow@alpha", "mcp", "start"] }
  }
}"#;

/// Stream emitted for the "Build a REST API" scenario.
pub const REST_API_STREAM: &str = concat!(
    r#"{"type":"system","subtype":"init","session_id":"abc"}"#, "\n",
    r#"{"type":"tool_call","tool":"mcp__claude-flow__agent_spawn","input":{"type":"coordinator","name":"lead"}}"#, "\n",
    r#"{"type":"tool_call","tool":"mcp__claude-flow__agent_spawn","input":{"type":"coder","name":"api-dev"}}"#, "\n",
    r#"{"type":"tool_call","tool":"mcp__claude-flow__task_create","input":{"description":"Design API spec"}}"#, "\n",
);

/// A workspace holding a descriptor and any stream fixtures.
pub struct Workspace {
    _temp: tempfile::TempDir,
    /// Canonical workspace root.
    pub root: PathBuf,
}

impl Workspace {
    pub fn setup() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().canonicalize().expect("canonical root");
        std::fs::write(root.join(".mcp.json"), DESCRIPTOR).expect("write descriptor");
        Self { _temp: temp, root }
    }

    /// Write a stream fixture and return its absolute path.
    pub fn fixture(&self, name: &str, body: &str) -> PathBuf {
        let path = self.root.join(name);
        std::fs::write(&path, body).expect("write fixture");
        path
    }

    /// Configuration whose collaborator runs `script` under `sh -c`.
    pub fn config(&self, script: &str) -> GlobalConfig {
        GlobalConfig {
            host_cli: "sh".into(),
            host_cli_args: vec!["-c".into(), script.into()],
            workspace_root: self.root.clone(),
            termination_grace_seconds: 2,
            ..GlobalConfig::default()
        }
    }

    /// Runner plus a fresh session and its execution config.
    pub fn prepare(
        &self,
        config: &GlobalConfig,
        task: &str,
        headless: bool,
    ) -> (SessionRunner, Session, ExecutionConfig) {
        let execution = build_execution_config(headless, &LaunchOptions::default(), config)
            .expect("execution config");
        let runner = SessionRunner::from_config(config).expect("runner");
        let session = runner.tracker().create(task, headless).expect("session");
        (runner, session, execution)
    }
}

/// Shell snippet that prints `path` to stdout.
pub fn cat(path: &Path) -> String {
    format!("cat '{}'", path.display())
}

/// Upper bound on how long any test session may take.
pub const TEST_DEADLINE: Duration = Duration::from_secs(20);
