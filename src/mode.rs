//! Execution-mode detection — interactive versus headless.
//!
//! The decision is a pure function of the invocation flags and a snapshot
//! of the process environment. CI sniffing is opt-in: without
//! `detect_ci` the environment never switches the mode on its own.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::execution::OutputFormat;

/// Environment variables whose presence marks a CI runner.
pub const CI_ENV_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "JENKINS_URL",
    "BUILDKITE",
    "CIRCLECI",
    "TRAVIS",
    "TF_BUILD",
    "CODEBUILD_BUILD_ID",
];

/// Whether the collaborator runs attached to a terminal or headless.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Attached terminal; the collaborator may prompt the user.
    #[default]
    Interactive,
    /// No terminal, no approval step; output is machine-readable.
    Headless,
}

/// Signal that selected headless execution.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "signal", content = "detail")]
pub enum HeadlessReason {
    /// `--executor` was passed.
    ExecutorFlag,
    /// A machine-readable output format was requested.
    OutputFormat,
    /// `--background` was passed.
    Background,
    /// A recognized CI variable is set (named here).
    CiEnvironment(String),
}

/// Invocation flags relevant to mode detection.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct InvocationSignals {
    /// Explicit executor flag.
    pub executor: bool,
    /// Requested output format, if any.
    pub output_format: Option<OutputFormat>,
    /// Background-execution flag.
    pub background: bool,
    /// Consider CI environment variables.
    pub detect_ci: bool,
}

/// Outcome of mode detection.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ModeDecision {
    /// Selected mode.
    pub mode: ExecutionMode,
    /// First signal that selected headless mode; `None` when interactive.
    pub reason: Option<HeadlessReason>,
}

impl ModeDecision {
    /// `true` when the run is headless.
    #[must_use]
    pub fn is_headless(&self) -> bool {
        self.mode == ExecutionMode::Headless
    }
}

/// Decide the execution mode from flags and an environment snapshot.
///
/// Signals are checked in a fixed order (executor, output format,
/// background, CI) so the reported reason is stable for identical input.
#[must_use]
pub fn detect_mode(signals: &InvocationSignals, env: &BTreeMap<String, String>) -> ModeDecision {
    let reason = if signals.executor {
        Some(HeadlessReason::ExecutorFlag)
    } else if signals
        .output_format
        .is_some_and(OutputFormat::is_machine_readable)
    {
        Some(HeadlessReason::OutputFormat)
    } else if signals.background {
        Some(HeadlessReason::Background)
    } else if signals.detect_ci {
        detect_ci(env).map(HeadlessReason::CiEnvironment)
    } else {
        None
    };

    ModeDecision {
        mode: if reason.is_some() {
            ExecutionMode::Headless
        } else {
            ExecutionMode::Interactive
        },
        reason,
    }
}

/// Name of the first recognized CI variable that is switched on.
#[must_use]
pub fn detect_ci(env: &BTreeMap<String, String>) -> Option<String> {
    CI_ENV_VARS
        .iter()
        .find(|key| env.get(**key).is_some_and(|value| is_truthy(value)))
        .map(|key| (*key).to_owned())
}

/// Snapshot the current process environment.
#[must_use]
pub fn process_env() -> BTreeMap<String, String> {
    std::env::vars().collect()
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}
