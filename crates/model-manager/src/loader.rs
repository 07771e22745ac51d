//! TFLite model loader
//!
//! This module reads a TFLite model file, validates its flatbuffer header and
//! exposes the pieces the metadata tooling needs: subgraph input/output
//! tensors, the model's metadata entries and its buffers. An archive of
//! associated files appended after the flatbuffer is detected and kept apart.

use std::path::Path;

use flatbuffers::VOffsetT;
use tracing::{debug, info};

use crate::archive;
use crate::error::{ModelError, Result};
use crate::flatbuf::{self, Table};
use crate::schema::{vt, TFLITE_FILE_IDENTIFIER};

/// A tensor referenced by a subgraph input or output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorInfo {
    /// Tensor name
    pub name: Option<String>,

    /// Shape; `-1` marks a dynamic dimension
    pub shape: Vec<i32>,

    /// TFLite tensor type code
    pub tensor_type: i8,
}

/// Inputs and outputs of one subgraph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubgraphInfo {
    /// Subgraph name
    pub name: Option<String>,

    /// Input tensors, in subgraph order
    pub inputs: Vec<TensorInfo>,

    /// Output tensors, in subgraph order
    pub outputs: Vec<TensorInfo>,
}

/// A named entry of the model's metadata list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    /// Entry name
    pub name: String,

    /// Index into the model's buffers
    pub buffer: u32,
}

/// A parsed TFLite model file
#[derive(Debug, Clone)]
pub struct TfliteModel {
    /// Full file contents
    bytes: Vec<u8>,

    /// Length of the flatbuffer part; anything after it is the packed archive
    model_len: usize,

    /// Schema version
    version: u32,

    /// Subgraphs
    subgraphs: Vec<SubgraphInfo>,

    /// Metadata entries
    metadata: Vec<MetadataEntry>,

    /// Number of buffers
    buffer_count: usize,

    /// Whether any buffer keeps its data outside the flatbuffer
    external_buffers: bool,
}

impl TfliteModel {
    /// Loads a model file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ModelError::NotFound(path.to_path_buf()));
        }

        info!("Loading model {}", path.display());
        let bytes = std::fs::read(path)?;

        Self::from_bytes(bytes)
    }

    /// Parses model bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(ModelError::InvalidModel(format!("file is only {} bytes", bytes.len())));
        }

        let identifier = flatbuf::file_identifier(&bytes)?;
        if identifier != TFLITE_FILE_IDENTIFIER.as_bytes() {
            return Err(ModelError::InvalidModel(format!(
                "expected file identifier {:?}, found {:?}",
                TFLITE_FILE_IDENTIFIER,
                String::from_utf8_lossy(identifier)
            )));
        }

        let model_len = archive::archive_start(&bytes).unwrap_or(bytes.len());
        let flatbuffer = &bytes[..model_len];
        let root = flatbuf::root_table(flatbuffer, Some(TFLITE_FILE_IDENTIFIER))?;

        let version = root.u32(vt::model::VERSION, 0)?;
        let subgraphs = Self::read_subgraphs(&root)?;
        let metadata = Self::read_metadata_entries(&root)?;

        let buffers = match root.vector(vt::model::BUFFERS)? {
            Some(buffers) => buffers.tables()?,
            None => Vec::new(),
        };
        let mut external_buffers = false;
        for buffer in &buffers {
            // Offsets 0 and 1 are placeholders; anything larger points past the flatbuffer.
            if buffer.u64(vt::buffer::OFFSET, 0)? > 1 {
                external_buffers = true;
            }
        }

        for entry in &metadata {
            if entry.buffer as usize >= buffers.len() {
                return Err(ModelError::InvalidModel(format!(
                    "metadata entry {} references buffer {} of {}",
                    entry.name,
                    entry.buffer,
                    buffers.len()
                )));
            }
        }

        debug!(
            "Parsed model v{}: {} subgraphs, {} buffers, {} metadata entries, {} packed bytes",
            version,
            subgraphs.len(),
            buffers.len(),
            metadata.len(),
            bytes.len() - model_len
        );

        Ok(Self {
            model_len,
            version,
            subgraphs,
            metadata,
            buffer_count: buffers.len(),
            external_buffers,
            bytes,
        })
    }

    fn read_subgraphs(root: &Table<'_>) -> Result<Vec<SubgraphInfo>> {
        let subgraphs = root
            .vector(vt::model::SUBGRAPHS)?
            .ok_or_else(|| ModelError::InvalidModel("model has no subgraphs".to_string()))?;

        let mut result = Vec::with_capacity(subgraphs.len());
        for subgraph in subgraphs.tables()? {
            let tensors = match subgraph.vector(vt::sub_graph::TENSORS)? {
                Some(tensors) => tensors.tables()?,
                None => Vec::new(),
            };

            let resolve = |slot: VOffsetT| -> Result<Vec<TensorInfo>> {
                let indices = match subgraph.vector(slot)? {
                    Some(indices) => indices.i32s()?,
                    None => Vec::new(),
                };

                indices
                    .into_iter()
                    .map(|index| -> Result<TensorInfo> {
                        let tensor = usize::try_from(index)
                            .ok()
                            .and_then(|i| tensors.get(i))
                            .ok_or_else(|| {
                                ModelError::InvalidModel(format!(
                                    "tensor index {} out of range ({} tensors)",
                                    index,
                                    tensors.len()
                                ))
                            })?;

                        Ok(TensorInfo {
                            name: tensor.owned_string(vt::tensor::NAME)?,
                            shape: match tensor.vector(vt::tensor::SHAPE)? {
                                Some(shape) => shape.i32s()?,
                                None => Vec::new(),
                            },
                            tensor_type: tensor.i8(vt::tensor::TYPE, 0)?,
                        })
                    })
                    .collect()
            };

            result.push(SubgraphInfo {
                name: subgraph.owned_string(vt::sub_graph::NAME)?,
                inputs: resolve(vt::sub_graph::INPUTS)?,
                outputs: resolve(vt::sub_graph::OUTPUTS)?,
            });
        }

        if result.is_empty() {
            return Err(ModelError::InvalidModel("model has no subgraphs".to_string()));
        }

        Ok(result)
    }

    fn read_metadata_entries(root: &Table<'_>) -> Result<Vec<MetadataEntry>> {
        let entries = match root.vector(vt::model::METADATA)? {
            Some(entries) => entries.tables()?,
            None => return Ok(Vec::new()),
        };

        entries
            .iter()
            .map(|entry| -> Result<MetadataEntry> {
                Ok(MetadataEntry {
                    name: entry.owned_string(vt::metadata::NAME)?.unwrap_or_default(),
                    buffer: entry.u32(vt::metadata::BUFFER, 0)?,
                })
            })
            .collect()
    }

    /// Full file contents, including any packed archive
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The flatbuffer without the packed archive
    pub fn flatbuffer(&self) -> &[u8] {
        &self.bytes[..self.model_len]
    }

    /// Whether associated files are packed after the flatbuffer
    pub fn has_packed_files(&self) -> bool {
        self.model_len < self.bytes.len()
    }

    /// Schema version
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Subgraphs of the model
    pub fn subgraphs(&self) -> &[SubgraphInfo] {
        &self.subgraphs
    }

    /// Metadata entries of the model
    pub fn metadata_entries(&self) -> &[MetadataEntry] {
        &self.metadata
    }

    /// Number of buffers
    pub fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    /// Whether any buffer stores its data outside the flatbuffer
    pub fn has_external_buffers(&self) -> bool {
        self.external_buffers
    }

    /// Number of classes along the last axis of the first output tensor
    ///
    /// `None` when the dimension is dynamic or the tensor has no shape.
    pub fn output_classes(&self) -> Option<usize> {
        let output = self.subgraphs.first()?.outputs.first()?;
        output
            .shape
            .last()
            .copied()
            .filter(|dim| *dim > 0)
            .map(|dim| dim as usize)
    }

    /// Contents of the buffer referenced by the named metadata entry
    pub fn metadata_buffer(&self, name: &str) -> Result<Option<&[u8]>> {
        let entry = match self.metadata.iter().rev().find(|entry| entry.name == name) {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let flatbuffer = self.flatbuffer();
        let root = flatbuf::root_table(flatbuffer, Some(TFLITE_FILE_IDENTIFIER))?;
        let buffers = root
            .vector(vt::model::BUFFERS)?
            .ok_or_else(|| ModelError::InvalidModel("model has no buffers".to_string()))?;

        let buffer = buffers.table(entry.buffer as usize)?;
        match buffer.vector(vt::buffer::DATA)? {
            Some(data) => Ok(Some(data.bytes()?)),
            None => Ok(Some(&[])),
        }
    }
}
