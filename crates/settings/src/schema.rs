//! Configuration schema
//!
//! The attacher configuration is a single immutable structure: file paths,
//! model descriptive fields, tensor descriptions and the ordered labels.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use common::types::ColorSpace;

/// Complete configuration of a metadata attachment run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttacherConfig {
    /// Source model file
    pub model_path: PathBuf,

    /// Destination of the metadata-augmented model
    pub output_path: PathBuf,

    /// Destination of the plain-text label file
    pub labels_path: PathBuf,

    /// Re-read the output model after writing it
    pub verify: bool,

    /// Class labels in class-index order
    pub labels: Vec<String>,

    /// Model descriptive fields
    pub model: ModelSection,

    /// Input tensor description
    pub input: InputTensorSection,

    /// Output tensor description
    pub output: OutputTensorSection,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Model descriptive fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSection {
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub license: String,
}

/// Image input tensor description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputTensorSection {
    pub name: String,
    pub description: String,

    /// Color space of the input image
    pub color_space: ColorSpace,

    /// Per-channel normalization mean
    pub mean: Vec<f32>,

    /// Per-channel normalization standard deviation
    pub std: Vec<f32>,

    /// Per-channel minimum raw value; empty to omit
    #[serde(default)]
    pub min: Vec<f32>,

    /// Per-channel maximum raw value; empty to omit
    #[serde(default)]
    pub max: Vec<f32>,
}

/// Feature output tensor description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTensorSection {
    pub name: String,
    pub description: String,

    /// Description recorded for the packed label file
    pub labels_file_description: String,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
