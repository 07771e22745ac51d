//! Common utilities and types for the KilimoVision metadata tooling
//!
//! This crate provides shared functionality used across the workspace,
//! including the error taxonomy, the metadata descriptor tree and utility functions.

pub mod error;
pub mod models;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{Error, Result};
pub use models::*;
pub use types::*;
