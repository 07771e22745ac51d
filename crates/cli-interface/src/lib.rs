//! Command-line interface for the KilimoVision metadata tooling
//!
//! This crate defines the command line and formats the console report.

pub mod cli;
pub mod formatters;

// Re-export commonly used types
pub use cli::{AttachArgs, Cli, Commands};
pub use formatters::Report;
