//! Error types for the common crate
//!
//! This module defines the error taxonomy shared by every crate of the
//! metadata tooling. Construction, validation and merge failures are the
//! recoverable kinds: the attacher degrades them to a labels-only run.

use thiserror::Error;

/// Result type for metadata tooling operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for metadata tooling operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A descriptor or label constant is malformed
    #[error("Construction error: {0}")]
    Construction(String),

    /// The model and the metadata disagree
    #[error("Validation error: {0}")]
    Validation(String),

    /// Reading, merging or writing the model container failed
    #[error("Merge error: {0}")]
    Merge(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if the error is a construction error
    pub fn is_construction(&self) -> bool {
        matches!(self, Error::Construction(_))
    }

    /// Returns true if the error is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Returns true if the error is a merge error
    pub fn is_merge(&self) -> bool {
        matches!(self, Error::Merge(_))
    }

    /// Returns true if the attacher may fall back to writing only the labels file
    pub fn is_recoverable(&self) -> bool {
        self.is_construction() || self.is_validation() || self.is_merge()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pipeline_errors_are_recoverable() {
        assert!(Error::Construction("empty name".into()).is_recoverable());
        assert!(Error::Validation("label count".into()).is_recoverable());
        assert!(Error::Merge("bad identifier".into()).is_recoverable());

        let io = Error::from(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"));
        assert!(!io.is_recoverable());
        assert!(!Error::Config("bad key".into()).is_recoverable());
        assert!(!Error::Internal("bug".into()).is_recoverable());
    }

    #[test]
    fn display_includes_kind_prefix() {
        let err = Error::Validation("10 labels, 12 classes".into());
        assert_eq!(err.to_string(), "Validation error: 10 labels, 12 classes");
    }
}
