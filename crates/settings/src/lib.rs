//! Configuration management for the KilimoVision metadata tooling
//!
//! This crate provides the immutable attacher configuration and the layered
//! loading of defaults, configuration file, environment and CLI overrides.

pub mod defaults;
pub mod manager;
pub mod overrides;
pub mod schema;
pub mod validation;

// Re-export commonly used types
pub use defaults::{DefaultConfig, TOMATO_DISEASE_LABELS};
pub use manager::{ConfigManager, LoadOptions};
pub use overrides::ConfigOverrides;
pub use schema::{
    AttacherConfig, InputTensorSection, LoggingSection, ModelSection, OutputTensorSection,
};
pub use validation::ConfigValidator;
