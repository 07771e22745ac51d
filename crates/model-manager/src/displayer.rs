//! Metadata displayer
//!
//! Reads the metadata and packed associated files back out of a populated
//! model.

use std::path::Path;

use tracing::debug;

use common::models::ModelMetadata;

use crate::archive;
use crate::error::{ModelError, Result};
use crate::loader::TfliteModel;
use crate::metadata::{metadata_to_json, parse_metadata_buffer};
use crate::schema::METADATA_FIELD_NAME;

/// Read-only view of the metadata embedded in a model
#[derive(Debug)]
pub struct MetadataDisplayer {
    /// Populated model
    model: TfliteModel,

    /// Parsed metadata tree
    metadata: ModelMetadata,

    /// Names of the packed files, in archive order
    packed_files: Vec<String>,
}

impl MetadataDisplayer {
    /// Opens the model file at `path`
    pub fn with_model_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_model(TfliteModel::load(path.as_ref())?)
    }

    /// Opens in-memory model bytes
    pub fn with_model_buffer(bytes: Vec<u8>) -> Result<Self> {
        Self::with_model(TfliteModel::from_bytes(bytes)?)
    }

    fn with_model(model: TfliteModel) -> Result<Self> {
        let buffer = model
            .metadata_buffer(METADATA_FIELD_NAME)?
            .ok_or(ModelError::MissingMetadata(METADATA_FIELD_NAME))?;
        let metadata = parse_metadata_buffer(buffer)?;
        let packed_files = archive::list_files(model.as_bytes())?;

        debug!(
            "Read {} bytes of metadata and {} packed files",
            buffer.len(),
            packed_files.len()
        );

        Ok(Self {
            model,
            metadata,
            packed_files,
        })
    }

    /// Raw metadata flatbuffer
    pub fn get_metadata_buffer(&self) -> Result<&[u8]> {
        self.model
            .metadata_buffer(METADATA_FIELD_NAME)?
            .ok_or(ModelError::MissingMetadata(METADATA_FIELD_NAME))
    }

    /// Metadata as pretty-printed JSON
    pub fn get_metadata_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&metadata_to_json(&self.metadata))?)
    }

    /// Names of the packed associated files
    pub fn get_packed_associated_file_list(&self) -> Vec<String> {
        self.packed_files.clone()
    }

    /// Contents of one packed associated file
    pub fn get_associated_file_buffer(&self, name: &str) -> Result<Vec<u8>> {
        archive::read_file(self.model.as_bytes(), name)
    }

    /// Parsed metadata tree
    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}
