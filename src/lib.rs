#![forbid(unsafe_code)]

//! Headless swarm launcher.
//!
//! Decides whether a run is headless, hands an MCP-enabled agent CLI its
//! configuration, and rebuilds orchestration state (agents, tasks, memory
//! writes, errors) from the CLI's line-delimited JSON output.

pub mod config;
pub mod errors;
pub mod mcp;
pub mod mode;
pub mod models;
pub mod orchestrator;
pub mod stream;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
