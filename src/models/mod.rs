//! Domain model module declarations.

pub mod event;
pub mod execution;
pub mod session;
pub mod summary;
