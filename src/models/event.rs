//! Stream events emitted by the collaborator and their classification.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Splits `mcp__<server>__<tool>` into its server and bare tool name.
static MCP_TOOL_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^mcp__(?P<server>.+?)__(?P<tool>.+)$").ok());

/// One decoded unit of collaborator output.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The collaborator invoked a tool.
    ToolCall {
        /// Tool name as emitted, including any `mcp__<server>__` prefix.
        tool: String,
        /// Tool arguments; opaque to the parser.
        payload: Value,
    },
    /// The collaborator reported an error.
    Error {
        /// Error text.
        message: String,
    },
    /// Any other object, kept verbatim.
    Other(Value),
}

/// Tool categories the reconstructor tracks individually.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// `agent_spawn`.
    AgentSpawn,
    /// `task_create` / `task_orchestrate`.
    TaskCreate,
    /// `memory_store` / `memory_usage`.
    MemoryStore,
    /// Anything else.
    Other,
}

impl ToolCategory {
    /// Classify a tool name, ignoring any `mcp__<server>__` prefix.
    #[must_use]
    pub fn from_tool_name(tool: &str) -> Self {
        match split_tool_name(tool).1 {
            "agent_spawn" => Self::AgentSpawn,
            "task_create" | "task_orchestrate" => Self::TaskCreate,
            "memory_store" | "memory_usage" => Self::MemoryStore,
            _ => Self::Other,
        }
    }
}

/// Split a tool name into `(server, bare_name)`.
#[must_use]
pub fn split_tool_name(tool: &str) -> (Option<&str>, &str) {
    MCP_TOOL_NAME
        .as_ref()
        .and_then(|re| re.captures(tool))
        .and_then(|caps| {
            let server = caps.name("server")?.as_str();
            let name = caps.name("tool")?.as_str();
            Some((Some(server), name))
        })
        .unwrap_or((None, tool))
}

/// A spawned agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Agent name, when the collaborator supplied one.
    pub name: Option<String>,
    /// Declared agent type (e.g., `coordinator`, `coder`).
    pub agent_type: Option<String>,
}

/// A created task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task description.
    pub description: String,
    /// Declared dependencies, in the order given.
    pub dependencies: Vec<String>,
}

/// A memory write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Memory key.
    pub key: String,
    /// Stored value, verbatim.
    pub value: Value,
    /// Optional namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// A tool call outside the tracked categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Tool name as emitted.
    pub tool: String,
    /// Tool arguments, verbatim.
    pub payload: Value,
}

/// A stream event routed to its summary bucket.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedEvent {
    /// Agent spawned.
    AgentSpawn(AgentRecord),
    /// Task created.
    TaskCreate(TaskRecord),
    /// Memory written.
    MemoryStore(MemoryRecord),
    /// Unmatched tool call.
    ToolCall(ToolCallRecord),
    /// Collaborator-reported error.
    Error(String),
    /// Unrecognized object.
    Other(Value),
}

impl ClassifiedEvent {
    /// Route a decoded event by tool-name category.
    #[must_use]
    pub fn classify(event: StreamEvent) -> Self {
        match event {
            StreamEvent::ToolCall { tool, payload } => classify_tool_call(tool, payload),
            StreamEvent::Error { message } => Self::Error(message),
            StreamEvent::Other(raw) => Self::Other(raw),
        }
    }

    /// `true` for any variant that came from a tool call.
    #[must_use]
    pub fn is_tool_call(&self) -> bool {
        matches!(
            self,
            Self::AgentSpawn(_) | Self::TaskCreate(_) | Self::MemoryStore(_) | Self::ToolCall(_)
        )
    }
}

fn classify_tool_call(tool: String, payload: Value) -> ClassifiedEvent {
    match ToolCategory::from_tool_name(&tool) {
        ToolCategory::AgentSpawn => ClassifiedEvent::AgentSpawn(AgentRecord {
            name: first_string(&payload, &["name", "agent_name"]),
            agent_type: first_string(&payload, &["type", "agent_type", "role"]),
        }),
        ToolCategory::TaskCreate => ClassifiedEvent::TaskCreate(TaskRecord {
            description: first_string(&payload, &["description", "task", "title"])
                .unwrap_or_default(),
            dependencies: string_list(&payload, &["dependencies", "depends_on"]),
        }),
        // `memory_usage` multiplexes reads and writes; only writes count.
        ToolCategory::MemoryStore if is_memory_write(&payload) => {
            ClassifiedEvent::MemoryStore(MemoryRecord {
                key: first_string(&payload, &["key"]).unwrap_or_default(),
                value: payload.get("value").cloned().unwrap_or(Value::Null),
                namespace: first_string(&payload, &["namespace"]),
            })
        }
        ToolCategory::MemoryStore | ToolCategory::Other => {
            ClassifiedEvent::ToolCall(ToolCallRecord { tool, payload })
        }
    }
}

fn is_memory_write(payload: &Value) -> bool {
    payload
        .get("action")
        .and_then(Value::as_str)
        .is_none_or(|action| action == "store")
}

fn first_string(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(str::to_owned)
}

fn string_list(payload: &Value, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_array))
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}
