//! Built-in configuration for the KilimoVision tomato disease classifier

use std::path::PathBuf;

use common::types::ColorSpace;
use crate::schema::{
    AttacherConfig, InputTensorSection, LoggingSection, ModelSection, OutputTensorSection,
};

/// Name of the configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "kilimo-metadata.toml";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "KILIMO";

/// Class labels of the tomato disease classifier, in output order
pub const TOMATO_DISEASE_LABELS: [&str; 10] = [
    "Tomato___Bacterial_spot",
    "Tomato___Early_blight",
    "Tomato___Late_blight",
    "Tomato___Leaf_Mold",
    "Tomato___Septoria_leaf_spot",
    "Tomato___Spider_mites Two-spotted_spider_mite",
    "Tomato___Target_Spot",
    "Tomato___Tomato_Yellow_Leaf_Curl_Virus",
    "Tomato___Tomato_mosaic_virus",
    "Tomato___healthy",
];

/// Default configuration provider
pub struct DefaultConfig;

impl DefaultConfig {
    /// Returns the built-in configuration
    pub fn attacher() -> AttacherConfig {
        AttacherConfig {
            model_path: PathBuf::from("KilimoVision.tflite"),
            output_path: PathBuf::from("KilimoVision_with_metadata.tflite"),
            labels_path: PathBuf::from("labels.txt"),
            verify: true,
            labels: TOMATO_DISEASE_LABELS.iter().map(|l| l.to_string()).collect(),
            model: ModelSection {
                name: "KilimoVision Tomato Disease Classifier".to_string(),
                description: "Identifies the disease present on a tomato plant leaf from an image."
                    .to_string(),
                version: "v1.0.0".to_string(),
                author: "KilimoVision Team".to_string(),
                license: "Apache License. Version 2.0".to_string(),
            },
            input: InputTensorSection {
                name: "input_image".to_string(),
                description: "Input image to be classified. 224x224 RGB image.".to_string(),
                color_space: ColorSpace::Rgb,
                // Raw [0, 255] pixels map to [0, 1].
                mean: vec![0.0, 0.0, 0.0],
                std: vec![255.0, 255.0, 255.0],
                min: vec![0.0, 0.0, 0.0],
                max: vec![255.0, 255.0, 255.0],
            },
            output: OutputTensorSection {
                name: "disease_prediction".to_string(),
                description: "Probabilities of the 10 disease classes.".to_string(),
                labels_file_description: "Labels for tomato disease categories.".to_string(),
            },
            logging: LoggingSection::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_tomato_classifier() {
        let config = DefaultConfig::attacher();
        assert_eq!(config.model.name, "KilimoVision Tomato Disease Classifier");
        assert_eq!(config.model.version, "v1.0.0");
        assert_eq!(config.labels.len(), 10);
        assert_eq!(config.labels[5], "Tomato___Spider_mites Two-spotted_spider_mite");
        assert_eq!(config.input.std, vec![255.0; 3]);
        assert!(config.verify);
    }
}
