//! Command-line overrides

use std::path::PathBuf;

use crate::schema::AttacherConfig;

/// Values supplied on the command line; `None` keeps the configured value
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub model_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub verify: Option<bool>,
    pub log_level: Option<String>,
    pub log_json: Option<bool>,
}

impl ConfigOverrides {
    /// Writes every present override into the configuration
    pub fn apply(&self, config: &mut AttacherConfig) {
        if let Some(path) = &self.model_path {
            config.model_path = path.clone();
        }
        if let Some(path) = &self.output_path {
            config.output_path = path.clone();
        }
        if let Some(path) = &self.labels_path {
            config.labels_path = path.clone();
        }
        if let Some(verify) = self.verify {
            config.verify = verify;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(json) = self.log_json {
            config.logging.json = json;
        }
    }
}
