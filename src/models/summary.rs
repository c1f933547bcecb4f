//! Orchestration summary folded from a session's event stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::event::{AgentRecord, ClassifiedEvent, MemoryRecord, TaskRecord, ToolCallRecord};

/// A stream line that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailure {
    /// 1-based line number in the collaborator's output.
    pub line: u64,
    /// Decoder error text.
    pub message: String,
}

/// Aggregated orchestration state for one session.
///
/// Records are appended in arrival order without deduplication. Once
/// [`finalize`](Self::finalize) has been called the summary is frozen and
/// further records are refused.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationSummary {
    /// Spawned agents.
    pub agents: Vec<AgentRecord>,
    /// Created tasks.
    pub tasks: Vec<TaskRecord>,
    /// Memory writes.
    pub memory: Vec<MemoryRecord>,
    /// Collaborator-reported error messages.
    pub errors: Vec<String>,
    /// Tool calls outside the tracked categories.
    pub other_tool_calls: Vec<ToolCallRecord>,
    /// Unrecognized objects, verbatim.
    pub other_events: Vec<Value>,
    /// Lines skipped because they could not be decoded.
    pub parse_errors: Vec<ParseFailure>,
    /// Total tool calls observed, tracked or not.
    pub tool_call_count: u64,
    /// Set once the event source has closed.
    pub finalized: bool,
}

impl OrchestrationSummary {
    /// Append one classified event. Returns `false` if the summary is finalized.
    pub fn record(&mut self, event: ClassifiedEvent) -> bool {
        if self.finalized {
            return false;
        }

        if event.is_tool_call() {
            self.tool_call_count += 1;
        }

        match event {
            ClassifiedEvent::AgentSpawn(agent) => self.agents.push(agent),
            ClassifiedEvent::TaskCreate(task) => self.tasks.push(task),
            ClassifiedEvent::MemoryStore(entry) => self.memory.push(entry),
            ClassifiedEvent::ToolCall(call) => self.other_tool_calls.push(call),
            ClassifiedEvent::Error(message) => self.errors.push(message),
            ClassifiedEvent::Other(raw) => self.other_events.push(raw),
        }
        true
    }

    /// Record an undecodable line. Returns `false` if the summary is finalized.
    pub fn record_parse_error(&mut self, line: u64, message: String) -> bool {
        if self.finalized {
            return false;
        }
        self.parse_errors.push(ParseFailure { line, message });
        true
    }

    /// Freeze the summary. Calling this again has no further effect.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    /// `true` when no agents, tasks, or memory writes were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty() && self.tasks.is_empty() && self.memory.is_empty()
    }

    /// Number of events that were decoded and classified.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.agents.len()
            + self.tasks.len()
            + self.memory.len()
            + self.errors.len()
            + self.other_tool_calls.len()
            + self.other_events.len()
    }

    /// Pretty JSON rendering written to the summary artifact.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if serialization fails.
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| crate::AppError::Io(format!("failed to serialize summary: {err}")))
    }
}
