//! Model Context Protocol collaborator configuration.

pub mod descriptor;
