//! Command implementations.
//!
//! Each command writes its human-readable output to the writer it is given;
//! logs go to stderr through `tracing`.

pub mod auth;
pub mod classes;

/// Result of a command.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;
