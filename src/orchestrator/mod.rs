//! Session orchestration modules.
//!
//! Covers execution-config building, collaborator spawning, summary
//! reconstruction, session tracking, and the pipeline that ties them
//! together.

pub mod builder;
pub mod launcher;
pub mod reconstructor;
pub mod runner;
pub mod session_tracker;
