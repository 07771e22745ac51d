//! Metadata attacher
//!
//! Builds the descriptor tree from the configuration, writes the labels file
//! and merges the serialized metadata into the model. Construction, validation
//! and merge failures degrade the run to a labels-only fallback; anything else
//! is returned as an error.

use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use common::error::{Error, Result};
use common::models::{
    AssociatedFile, ContentProperties, LabelSet, ModelDescriptor, ModelMetadata,
    NormalizationOptions, ProcessUnit, Stats, SubGraphMetadata, TensorMetadata,
};
use common::types::AssociatedFileType;
use common::utils::{file_name_of, format_bytes, format_duration, measure_execution_time};
use model_manager::schema::MIN_PARSER_VERSION;
use model_manager::{create_metadata_buffer, MetadataDisplayer, MetadataPopulator, TfliteModel};
use settings::AttacherConfig;

use crate::outcome::{AttachOutcome, MergeReport, Stage, Verification, VerifiedMetadata};

/// Attaches metadata and class labels to a model
pub struct MetadataAttacher {
    /// Run configuration
    config: AttacherConfig,
}

impl MetadataAttacher {
    /// Creates a new attacher
    pub fn new(config: AttacherConfig) -> Self {
        Self { config }
    }

    /// Gets the configuration
    pub fn config(&self) -> &AttacherConfig {
        &self.config
    }

    /// Builds and validates the descriptor tree
    pub fn build_metadata(&self) -> Result<ModelMetadata> {
        let model = &self.config.model;
        let descriptor = ModelDescriptor {
            name: model.name.clone(),
            description: model.description.clone(),
            version: model.version.clone(),
            author: model.author.clone(),
            license: model.license.clone(),
        };
        descriptor.validate()?;

        let labels = LabelSet::new(self.config.labels.clone())?;
        let labels_file = file_name_of(&self.config.labels_path)?;

        // Input: image, normalization, raw value range
        let input = &self.config.input;
        let stats = (!input.min.is_empty() || !input.max.is_empty()).then(|| Stats {
            max: input.max.clone(),
            min: input.min.clone(),
        });
        let input_tensor = TensorMetadata {
            name: Some(input.name.clone()),
            description: Some(input.description.clone()),
            content: Some(ContentProperties::Image {
                color_space: input.color_space,
            }),
            process_units: vec![ProcessUnit::Normalization(NormalizationOptions {
                mean: input.mean.clone(),
                std: input.std.clone(),
            })],
            stats,
            associated_files: Vec::new(),
        };
        input_tensor.validate()?;

        // Output: class scores, labelled by the packed labels file
        let output = &self.config.output;
        let output_tensor = TensorMetadata {
            name: Some(output.name.clone()),
            description: Some(output.description.clone()),
            content: Some(ContentProperties::Feature),
            associated_files: vec![AssociatedFile::new(
                labels_file,
                output.labels_file_description.clone(),
                AssociatedFileType::TensorAxisLabels,
            )],
            ..Default::default()
        };
        output_tensor.validate()?;

        let mut metadata = ModelMetadata::from_descriptor(&descriptor);
        metadata.subgraph_metadata.push(SubGraphMetadata {
            input_tensor_metadata: vec![input_tensor],
            output_tensor_metadata: vec![output_tensor],
            ..Default::default()
        });
        metadata.min_parser_version = Some(MIN_PARSER_VERSION.to_string());

        debug!("Built metadata for {} with {} labels", model.name, labels.len());
        Ok(metadata)
    }

    /// Writes the labels file, one label per line
    ///
    /// Runs whether or not the metadata can be built, so it does not depend on
    /// the labels passing validation.
    pub fn write_labels(&self) -> Result<PathBuf> {
        let path = &self.config.labels_path;
        std::fs::write(path, self.config.labels.join("\n"))?;
        info!("Wrote {} labels to {}", self.config.labels.len(), path.display());

        Ok(path.clone())
    }

    /// Merges the metadata and the labels file into the model
    ///
    /// The output model is either written completely or not at all.
    pub fn merge(&self, metadata: &ModelMetadata) -> Result<MergeReport> {
        let config = &self.config;
        if config.model_path == config.output_path {
            return Err(Error::Validation(format!(
                "output path must differ from the source model {}",
                config.model_path.display()
            )));
        }

        let ((bytes, metadata_bytes, packed_files), elapsed) = measure_execution_time(|| {
            let model = TfliteModel::load(&config.model_path)?;

            match model.output_classes() {
                Some(classes) if classes != config.labels.len() => {
                    return Err(Error::Validation(format!(
                        "{} labels for a model with {} output classes",
                        config.labels.len(),
                        classes
                    )));
                }
                Some(_) => {}
                None => warn!("Output class dimension is dynamic, skipping the label count check"),
            }

            let buffer = create_metadata_buffer(metadata);
            let metadata_bytes = buffer.len();

            let mut populator = MetadataPopulator::from_model(model);
            populator.load_metadata_buffer(buffer)?;
            populator.load_associated_files(&[&config.labels_path])?;
            let bytes = populator.save_model_with_metadata(&config.output_path)?;

            let packed_files: Vec<String> = metadata
                .all_associated_files()
                .map(|file| file.name.clone())
                .collect();
            Ok((bytes, metadata_bytes, packed_files))
        })?;

        let sha256 = hex::encode(Sha256::digest(&bytes));
        info!(
            "Merged metadata into {} ({}) in {}",
            config.output_path.display(),
            format_bytes(bytes.len() as u64),
            format_duration(elapsed)
        );

        Ok(MergeReport {
            output_path: config.output_path.clone(),
            bytes: bytes.len(),
            sha256,
            metadata_bytes,
            packed_files,
            elapsed,
        })
    }

    /// Reads the output model back and checks it against what was written
    pub fn verify(&self) -> Result<VerifiedMetadata> {
        let expected = self.build_metadata()?;
        let displayer = MetadataDisplayer::with_model_file(&self.config.output_path)?;

        if displayer.metadata() != &expected {
            return Err(Error::Validation(
                "metadata read back from the output model differs from the metadata written"
                    .to_string(),
            ));
        }

        let labels_file = file_name_of(&self.config.labels_path)?;
        let packed_labels = displayer.get_associated_file_buffer(&labels_file)?;
        let labels = LabelSet::new(self.config.labels.clone())?;
        if packed_labels != labels.to_file_contents().into_bytes() {
            return Err(Error::Validation(format!(
                "packed {} differs from the labels",
                labels_file
            )));
        }

        Ok(VerifiedMetadata {
            json: displayer.get_metadata_json()?,
            packed_files: displayer.get_packed_associated_file_list(),
            metadata: displayer.metadata().clone(),
        })
    }

    /// Runs the whole attachment
    ///
    /// Returns `Err` only for failures that are not construction, validation
    /// or merge errors, such as failing to write the labels file.
    pub fn run(&self) -> Result<AttachOutcome> {
        info!("Beginning metadata addition process");

        let metadata = match self.build_metadata() {
            Ok(metadata) => metadata,
            Err(error) if error.is_recoverable() => {
                return self.fall_back(Stage::Construction, error)
            }
            Err(error) => return Err(error),
        };

        let labels_path = self.write_labels()?;

        let report = match self.merge(&metadata) {
            Ok(report) => report,
            Err(error) if error.is_recoverable() => return self.fall_back(Stage::Merge, error),
            Err(error) => return Err(error),
        };

        let verification = if self.config.verify {
            match self.verify() {
                Ok(verified) => Verification::Verified(verified),
                Err(error) => {
                    warn!("Verification failed: {}", error);
                    Verification::Failed(error.to_string())
                }
            }
        } else {
            Verification::Skipped
        };

        Ok(AttachOutcome::Completed {
            labels_path,
            report,
            verification,
        })
    }

    fn fall_back(&self, stage: Stage, error: Error) -> Result<AttachOutcome> {
        warn!("Error {}: {}", stage, error);
        let labels_path = self.write_labels()?;

        Ok(AttachOutcome::Fallback {
            labels_path,
            stage,
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_manager::fixtures::{build_classifier_model, ClassifierSpec};
    use settings::DefaultConfig;
    use std::path::Path;

    fn config_in(dir: &Path) -> AttacherConfig {
        let mut config = DefaultConfig::attacher();
        config.model_path = dir.join("KilimoVision.tflite");
        config.output_path = dir.join("KilimoVision_with_metadata.tflite");
        config.labels_path = dir.join("labels.txt");
        config
    }

    #[test]
    fn builds_the_tomato_classifier_tree() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = MetadataAttacher::new(config_in(dir.path())).build_metadata().unwrap();

        assert_eq!(metadata.name.as_deref(), Some("KilimoVision Tomato Disease Classifier"));
        assert_eq!(metadata.min_parser_version.as_deref(), Some(MIN_PARSER_VERSION));

        let subgraph = &metadata.subgraph_metadata[0];
        let input = &subgraph.input_tensor_metadata[0];
        assert_eq!(input.normalization().unwrap().mean, vec![0.0; 3]);
        assert_eq!(input.stats.as_ref().unwrap().max, vec![255.0; 3]);

        let files = &subgraph.output_tensor_metadata[0].associated_files;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "labels.txt");
        assert_eq!(files[0].file_type, AssociatedFileType::TensorAxisLabels);
    }

    #[test]
    fn blank_descriptor_field_is_a_construction_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.model.author = String::new();

        let err = MetadataAttacher::new(config).build_metadata().unwrap_err();
        assert!(err.is_construction());
    }

    #[test]
    fn missing_stats_are_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.input.min.clear();
        config.input.max.clear();

        let metadata = MetadataAttacher::new(config).build_metadata().unwrap();
        assert!(metadata.subgraph_metadata[0].input_tensor_metadata[0].stats.is_none());
    }

    #[test]
    fn merge_refuses_to_overwrite_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.output_path = config.model_path.clone();
        let model = build_classifier_model(&ClassifierSpec::default());
        std::fs::write(&config.model_path, model).unwrap();

        let attacher = MetadataAttacher::new(config);
        let metadata = attacher.build_metadata().unwrap();
        assert!(attacher.merge(&metadata).unwrap_err().is_validation());
    }

    #[test]
    fn merge_reports_checksum_and_packed_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let model = build_classifier_model(&ClassifierSpec::default());
        std::fs::write(&config.model_path, model).unwrap();

        let attacher = MetadataAttacher::new(config);
        attacher.write_labels().unwrap();
        let metadata = attacher.build_metadata().unwrap();
        let report = attacher.merge(&metadata).unwrap();

        let written = std::fs::read(&report.output_path).unwrap();
        assert_eq!(report.bytes, written.len());
        assert_eq!(report.metadata_bytes, create_metadata_buffer(&metadata).len());
        assert_eq!(report.sha256, hex::encode(Sha256::digest(&written)));
        assert_eq!(report.packed_files, vec!["labels.txt".to_string()]);
    }
}
