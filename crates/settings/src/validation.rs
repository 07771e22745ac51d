//! Configuration validation
//!
//! Only checks what must hold before anything is written. Descriptor
//! invariants are checked when the metadata is built so that a malformed
//! constant degrades to a labels-only run instead of aborting.

use common::error::{Error, Result};
use crate::schema::AttacherConfig;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the configuration
    pub fn validate(config: &AttacherConfig) -> Result<()> {
        for (key, path) in [
            ("model_path", &config.model_path),
            ("output_path", &config.output_path),
            ("labels_path", &config.labels_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(Error::Config(format!("{} must not be empty", key)));
            }
        }

        if config.labels_path.file_name().is_none() {
            return Err(Error::Config(format!(
                "labels_path has no file name: {}",
                config.labels_path.display()
            )));
        }

        if config.logging.level.trim().is_empty() {
            return Err(Error::Config("logging.level must not be empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::DefaultConfig;
    use std::path::PathBuf;

    #[test]
    fn defaults_are_valid() {
        assert!(ConfigValidator::validate(&DefaultConfig::attacher()).is_ok());
    }

    #[test]
    fn empty_output_path_is_rejected() {
        let mut config = DefaultConfig::attacher();
        config.output_path = PathBuf::new();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn labels_path_needs_a_file_name() {
        let mut config = DefaultConfig::attacher();
        config.labels_path = PathBuf::from("..");
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
