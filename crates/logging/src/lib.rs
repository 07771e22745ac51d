//! Logging for the KilimoVision metadata tooling
//!
//! Installs the global `tracing` subscriber. Log lines go to stderr so that
//! the console report printed on stdout stays readable.

use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use common::error::{Error, Result};
use settings::LoggingSection;

/// Builds the filter: `RUST_LOG` when set, otherwise the configured level
pub fn build_filter(section: &LoggingSection) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&section.level)
            .map_err(|e| Error::Config(format!("invalid log level '{}': {}", section.level, e))),
    }
}

/// Initializes logging
///
/// Fails if a global subscriber is already installed.
pub fn init(section: &LoggingSection) -> Result<()> {
    let filter = build_filter(section)?;

    let installed = if section.json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init()
    };

    installed.map_err(|e| Error::Internal(format!("failed to install log subscriber: {}", e)))?;
    debug!("Logging initialized (level {}, json {})", section.level, section.json);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_level() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let section = LoggingSection {
            level: "model_manager=loud".to_string(),
            json: false,
        };
        assert!(build_filter(&section).is_err());
    }

    #[test]
    fn accepts_directives() {
        let section = LoggingSection {
            level: "warn,model_manager=debug".to_string(),
            json: true,
        };
        assert!(build_filter(&section).is_ok());
    }
}
