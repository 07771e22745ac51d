//! Metadata descriptor models
//!
//! This module defines the in-memory descriptor tree that is serialized into
//! the model container: the model descriptor, tensor descriptors, process
//! units, statistics and associated files, plus the ordered label set.

use crate::error::{Error, Result};
use crate::types::{AssociatedFileType, ColorSpace};

/// Descriptive fields of a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// Model name
    pub name: String,
    /// Free-text description
    pub description: String,
    /// Model version
    pub version: String,
    /// Model author
    pub author: String,
    /// Model license
    pub license: String,
}

impl ModelDescriptor {
    /// Checks that every descriptive field is non-empty
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("name", &self.name),
            ("description", &self.description),
            ("version", &self.version),
            ("author", &self.author),
            ("license", &self.license),
        ];

        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(Error::Construction(format!("model {} must not be empty", field)));
            }
        }

        Ok(())
    }
}

/// Semantics of the values held by a tensor
#[derive(Debug, Clone, PartialEq)]
pub enum ContentProperties {
    /// Generic feature vector
    Feature,
    /// Image in the given color space
    Image {
        /// Color space of the image
        color_space: ColorSpace,
    },
}

/// Per-channel normalization `(x - mean) / std`
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationOptions {
    /// Per-channel mean
    pub mean: Vec<f32>,
    /// Per-channel standard deviation
    pub std: Vec<f32>,
}

/// A declared preprocessing or postprocessing step
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessUnit {
    /// Mean subtraction and scale division
    Normalization(NormalizationOptions),
}

/// Value range statistics of a tensor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    /// Per-channel maximum
    pub max: Vec<f32>,
    /// Per-channel minimum
    pub min: Vec<f32>,
}

/// An auxiliary file packed alongside the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociatedFile {
    /// File name inside the packed archive
    pub name: String,
    /// Human readable description
    pub description: Option<String>,
    /// Role of the file
    pub file_type: AssociatedFileType,
    /// Locale of the content, if any
    pub locale: Option<String>,
    /// Version of the content, if any
    pub version: Option<String>,
}

impl AssociatedFile {
    /// Creates an associated file descriptor with no locale or version
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        file_type: AssociatedFileType,
    ) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            file_type,
            locale: None,
            version: None,
        }
    }
}

/// Metadata of one input or output tensor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TensorMetadata {
    /// Tensor name
    pub name: Option<String>,
    /// Tensor description
    pub description: Option<String>,
    /// Content semantics
    pub content: Option<ContentProperties>,
    /// Declared processing steps
    pub process_units: Vec<ProcessUnit>,
    /// Value range statistics
    pub stats: Option<Stats>,
    /// Files describing this tensor
    pub associated_files: Vec<AssociatedFile>,
}

impl TensorMetadata {
    /// Returns the first normalization unit, if any
    pub fn normalization(&self) -> Option<&NormalizationOptions> {
        self.process_units.iter().map(|unit| match unit {
            ProcessUnit::Normalization(options) => options,
        }).next()
    }

    /// Checks the tensor invariants
    ///
    /// Normalization vectors must agree in length with each other and with the
    /// channel count of an image tensor, and no standard deviation may be zero.
    /// Min/max statistics must agree in length and be ordered.
    pub fn validate(&self) -> Result<()> {
        let label = self.name.as_deref().unwrap_or("<unnamed>");

        if self.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            return Err(Error::Construction("tensor name must not be empty".to_string()));
        }

        let channels = match &self.content {
            Some(ContentProperties::Image { color_space }) => color_space.channels(),
            _ => None,
        };

        for unit in &self.process_units {
            let ProcessUnit::Normalization(options) = unit;

            if options.mean.is_empty() || options.mean.len() != options.std.len() {
                return Err(Error::Construction(format!(
                    "tensor {}: normalization mean ({}) and std ({}) must be non-empty and equal",
                    label,
                    options.mean.len(),
                    options.std.len()
                )));
            }

            if let Some(channels) = channels {
                if options.mean.len() != channels {
                    return Err(Error::Construction(format!(
                        "tensor {}: normalization has {} values but the image has {} channels",
                        label,
                        options.mean.len(),
                        channels
                    )));
                }
            }

            if options.std.iter().any(|s| *s == 0.0 || !s.is_finite()) {
                return Err(Error::Construction(format!(
                    "tensor {}: normalization std must be finite and non-zero",
                    label
                )));
            }
        }

        if let Some(stats) = &self.stats {
            if !stats.min.is_empty() && !stats.max.is_empty() {
                if stats.min.len() != stats.max.len() {
                    return Err(Error::Construction(format!(
                        "tensor {}: stats min ({}) and max ({}) differ in length",
                        label,
                        stats.min.len(),
                        stats.max.len()
                    )));
                }

                if stats.min.iter().zip(&stats.max).any(|(lo, hi)| lo > hi) {
                    return Err(Error::Construction(format!(
                        "tensor {}: stats min exceeds max",
                        label
                    )));
                }
            }
        }

        for file in &self.associated_files {
            if file.name.trim().is_empty() {
                return Err(Error::Construction(format!(
                    "tensor {}: associated file name must not be empty",
                    label
                )));
            }
        }

        Ok(())
    }
}

/// Metadata of one subgraph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubGraphMetadata {
    /// Subgraph name
    pub name: Option<String>,
    /// Subgraph description
    pub description: Option<String>,
    /// Input tensors, in model order
    pub input_tensor_metadata: Vec<TensorMetadata>,
    /// Output tensors, in model order
    pub output_tensor_metadata: Vec<TensorMetadata>,
    /// Files describing the whole subgraph
    pub associated_files: Vec<AssociatedFile>,
}

/// Root of the descriptor tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelMetadata {
    /// Model name
    pub name: Option<String>,
    /// Model description
    pub description: Option<String>,
    /// Model version
    pub version: Option<String>,
    /// Subgraphs, in model order
    pub subgraph_metadata: Vec<SubGraphMetadata>,
    /// Model author
    pub author: Option<String>,
    /// Model license
    pub license: Option<String>,
    /// Files describing the whole model
    pub associated_files: Vec<AssociatedFile>,
    /// Oldest metadata parser able to read this tree
    pub min_parser_version: Option<String>,
}

impl ModelMetadata {
    /// Creates a tree with the model's descriptive fields and no subgraphs
    pub fn from_descriptor(descriptor: &ModelDescriptor) -> Self {
        Self {
            name: Some(descriptor.name.clone()),
            description: Some(descriptor.description.clone()),
            version: Some(descriptor.version.clone()),
            author: Some(descriptor.author.clone()),
            license: Some(descriptor.license.clone()),
            ..Default::default()
        }
    }

    /// Iterates over every associated file recorded anywhere in the tree
    pub fn all_associated_files(&self) -> impl Iterator<Item = &AssociatedFile> {
        self.associated_files
            .iter()
            .chain(self.subgraph_metadata.iter().flat_map(|subgraph| {
                subgraph
                    .associated_files
                    .iter()
                    .chain(tensor_files(&subgraph.input_tensor_metadata))
                    .chain(tensor_files(&subgraph.output_tensor_metadata))
            }))
    }
}

fn tensor_files(tensors: &[TensorMetadata]) -> impl Iterator<Item = &AssociatedFile> {
    tensors.iter().flat_map(|tensor| tensor.associated_files.iter())
}

/// Ordered class labels; the position of a label is its class index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    /// Creates a label set, rejecting empty sets and labels that would break the one-per-line file
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(Error::Construction("label set must not be empty".to_string()));
        }

        for (index, label) in labels.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(Error::Construction(format!("label {} is empty", index)));
            }
            if label.contains('\n') || label.contains('\r') {
                return Err(Error::Construction(format!("label {} contains a line break", index)));
            }
        }

        Ok(Self { labels })
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false; an empty set cannot be constructed
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// File contents: one label per line, no trailing newline
    pub fn to_file_contents(&self) -> String {
        self.labels.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb_input() -> TensorMetadata {
        TensorMetadata {
            name: Some("input_image".into()),
            description: Some("Input image".into()),
            content: Some(ContentProperties::Image { color_space: ColorSpace::Rgb }),
            process_units: vec![ProcessUnit::Normalization(NormalizationOptions {
                mean: vec![0.0; 3],
                std: vec![255.0; 3],
            })],
            stats: Some(Stats { max: vec![255.0; 3], min: vec![0.0; 3] }),
            associated_files: Vec::new(),
        }
    }

    #[test]
    fn descriptor_rejects_blank_fields() {
        let descriptor = ModelDescriptor {
            name: "Classifier".into(),
            description: "desc".into(),
            version: " ".into(),
            author: "team".into(),
            license: "MIT".into(),
        };
        let err = descriptor.validate().unwrap_err();
        assert!(err.is_construction());
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn rgb_tensor_with_three_channels_is_valid() {
        assert!(rgb_input().validate().is_ok());
        assert_eq!(rgb_input().normalization().unwrap().std, vec![255.0; 3]);
    }

    #[test]
    fn channel_mismatch_is_a_construction_error() {
        let mut tensor = rgb_input();
        tensor.process_units = vec![ProcessUnit::Normalization(NormalizationOptions {
            mean: vec![0.0; 1],
            std: vec![255.0; 1],
        })];
        assert!(tensor.validate().unwrap_err().is_construction());
    }

    #[test]
    fn zero_std_is_rejected() {
        let mut tensor = rgb_input();
        tensor.process_units = vec![ProcessUnit::Normalization(NormalizationOptions {
            mean: vec![0.0; 3],
            std: vec![255.0, 0.0, 255.0],
        })];
        assert!(tensor.validate().is_err());
    }

    #[test]
    fn inverted_stats_are_rejected() {
        let mut tensor = rgb_input();
        tensor.stats = Some(Stats { max: vec![0.0; 3], min: vec![255.0; 3] });
        assert!(tensor.validate().is_err());
    }

    #[test]
    fn label_set_joins_without_trailing_newline() {
        let labels = LabelSet::new(vec!["a".into(), "b".into(), "c".into()]).unwrap();
        assert_eq!(labels.to_file_contents(), "a\nb\nc");
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn label_set_rejects_line_breaks_and_empty_sets() {
        assert!(LabelSet::new(Vec::new()).is_err());
        assert!(LabelSet::new(vec!["ok".into(), "two\nlines".into()]).is_err());
    }

    #[test]
    fn associated_files_are_collected_from_every_level() {
        let mut metadata = ModelMetadata::default();
        metadata
            .associated_files
            .push(AssociatedFile::new("model.txt", "m", AssociatedFileType::Descriptions));
        let mut output = TensorMetadata::default();
        output
            .associated_files
            .push(AssociatedFile::new("labels.txt", "l", AssociatedFileType::TensorAxisLabels));
        metadata.subgraph_metadata.push(SubGraphMetadata {
            output_tensor_metadata: vec![output],
            ..Default::default()
        });

        let names: Vec<_> = metadata.all_associated_files().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["model.txt", "labels.txt"]);
    }
}
