//! Configuration manager
//!
//! Layers the configuration sources in increasing precedence: built-in
//! defaults, an optional TOML file, `KILIMO_*` environment variables and
//! finally command-line overrides.

use std::path::{Path, PathBuf};

use common::error::{Error, Result};
use config::{Config, Environment, File, FileFormat, Map};
use tracing::{debug, info};

use crate::defaults::{DefaultConfig, DEFAULT_CONFIG_FILE, ENV_PREFIX};
use crate::overrides::ConfigOverrides;
use crate::schema::AttacherConfig;
use crate::validation::ConfigValidator;

/// Options controlling where configuration is read from
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit configuration file; when set the file must exist
    pub config_file: Option<PathBuf>,

    /// Replaces the process environment as the variable source
    pub env: Option<Map<String, String>>,
}

/// Configuration manager
#[derive(Debug, Clone)]
pub struct ConfigManager {
    /// Effective configuration
    config: AttacherConfig,

    /// Configuration file that contributed, if any
    config_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Loads the layered configuration
    pub fn load(options: &LoadOptions) -> Result<Self> {
        let defaults = Config::try_from(&DefaultConfig::attacher()).map_err(config_error)?;

        let (file_path, required) = match &options.config_file {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("labels")
            .source(options.env.clone());

        let config: AttacherConfig = Config::builder()
            .add_source(defaults)
            .add_source(
                File::from(file_path.as_path())
                    .format(FileFormat::Toml)
                    .required(required),
            )
            .add_source(environment)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)?;

        ConfigValidator::validate(&config)?;

        let config_file = file_path.exists().then_some(file_path);
        match &config_file {
            Some(path) => info!("Loaded configuration from {}", path.display()),
            None => debug!("No configuration file found, using built-in defaults"),
        }

        Ok(Self { config, config_file })
    }

    /// Wraps an already assembled configuration
    pub fn from_config(config: AttacherConfig) -> Result<Self> {
        ConfigValidator::validate(&config)?;

        Ok(Self {
            config,
            config_file: None,
        })
    }

    /// Applies command-line overrides and re-validates
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> Result<()> {
        let mut config = self.config.clone();
        overrides.apply(&mut config);
        ConfigValidator::validate(&config)?;
        self.config = config;

        Ok(())
    }

    /// Gets the effective configuration
    pub fn config(&self) -> &AttacherConfig {
        &self.config
    }

    /// Gets the configuration file that was read, if any
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// Renders the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(&self.config).map_err(|e| Error::Config(e.to_string()))
    }
}

fn config_error(err: config::ConfigError) -> Error {
    Error::Config(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn empty_env() -> Option<Map<String, String>> {
        Some(Map::new())
    }

    #[test]
    fn defaults_load_without_a_file() {
        let manager = ConfigManager::load(&LoadOptions {
            config_file: None,
            env: empty_env(),
        })
        .unwrap();

        assert_eq!(manager.config(), &DefaultConfig::attacher());
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "output_path = \"out/model.tflite\"\nverify = false\n\n[model]\nversion = \"v2.0.0\"\n"
        )
        .unwrap();

        let manager = ConfigManager::load(&LoadOptions {
            config_file: Some(file.path().to_path_buf()),
            env: empty_env(),
        })
        .unwrap();

        let config = manager.config();
        assert_eq!(config.output_path, PathBuf::from("out/model.tflite"));
        assert!(!config.verify);
        assert_eq!(config.model.version, "v2.0.0");
        assert_eq!(config.model.name, "KilimoVision Tomato Disease Classifier");
        assert_eq!(manager.config_file(), Some(file.path()));
    }

    #[test]
    fn environment_overrides_file() {
        let mut env = Map::new();
        env.insert("KILIMO_MODEL__AUTHOR".to_string(), "Field Lab".to_string());
        env.insert("KILIMO_LABELS_PATH".to_string(), "assets/labels.txt".to_string());

        let manager = ConfigManager::load(&LoadOptions {
            config_file: None,
            env: Some(env),
        })
        .unwrap();

        assert_eq!(manager.config().model.author, "Field Lab");
        assert_eq!(manager.config().labels_path, PathBuf::from("assets/labels.txt"));
    }

    #[test]
    fn missing_explicit_file_is_a_config_error() {
        let err = ConfigManager::load(&LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/kilimo.toml")),
            env: empty_env(),
        })
        .unwrap_err();

        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn overrides_take_precedence() {
        let mut manager = ConfigManager::from_config(DefaultConfig::attacher()).unwrap();
        manager
            .apply_overrides(&ConfigOverrides {
                model_path: Some(PathBuf::from("other.tflite")),
                verify: Some(false),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(manager.config().model_path, PathBuf::from("other.tflite"));
        assert!(!manager.config().verify);
    }

    #[test]
    fn toml_rendering_contains_labels_and_sections() {
        let manager = ConfigManager::from_config(DefaultConfig::attacher()).unwrap();
        let rendered = manager.to_toml().unwrap();

        assert!(rendered.contains("Tomato___healthy"));
        assert!(rendered.contains("[model]"));
        assert!(rendered.contains("color_space = \"RGB\""));
    }
}
