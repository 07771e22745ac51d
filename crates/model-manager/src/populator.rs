//! Metadata populator
//!
//! This module embeds a metadata flatbuffer into a TFLite model and packs the
//! associated files after it.
//!
//! The original flatbuffer is never rewritten. A new root `Model` table is
//! placed in front of it, pointing forward at every original vector, with a
//! buffers list and a metadata list that carry one extra entry each. The
//! prefix is padded to [`BUFFER_ALIGNMENT`] so the original data keeps its
//! alignment.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use flatbuffers::VOffsetT;
use tracing::{debug, info, warn};

use common::models::ModelMetadata;

use crate::archive::{self, PackedFile};
use crate::error::{ModelError, Result};
use crate::flatbuf::{self, ByteWriter};
use crate::loader::TfliteModel;
use crate::metadata::parse_metadata_buffer;
use crate::schema::{vt, BUFFER_ALIGNMENT, METADATA_FIELD_NAME, TFLITE_FILE_IDENTIFIER};

/// Where an offset in the new root must point
#[derive(Debug, Clone, Copy)]
enum Target {
    /// Position inside the original flatbuffer
    Original(usize),
    /// Position inside the prefix
    Prefix(usize),
}

/// Embeds metadata and associated files into a model
pub struct MetadataPopulator {
    /// Model to populate
    model: TfliteModel,

    /// Source file, when loaded from disk
    model_file: Option<PathBuf>,

    /// Serialized metadata
    metadata_buffer: Option<Vec<u8>>,

    /// Files to pack, in load order
    associated_files: Vec<PackedFile>,
}

impl MetadataPopulator {
    /// Creates a populator for the model file at `path`
    pub fn with_model_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let model = TfliteModel::load(path)?;

        Ok(Self {
            model_file: Some(path.to_path_buf()),
            ..Self::from_model(model)
        })
    }

    /// Creates a populator for in-memory model bytes
    pub fn with_model_buffer(bytes: Vec<u8>) -> Result<Self> {
        Ok(Self::from_model(TfliteModel::from_bytes(bytes)?))
    }

    /// Creates a populator for an already loaded model
    pub fn from_model(model: TfliteModel) -> Self {
        Self {
            model,
            model_file: None,
            metadata_buffer: None,
            associated_files: Vec::new(),
        }
    }

    /// Loads the metadata flatbuffer to embed
    ///
    /// The buffer is parsed immediately so a malformed one is rejected here.
    pub fn load_metadata_buffer(&mut self, buffer: Vec<u8>) -> Result<()> {
        parse_metadata_buffer(&buffer)?;
        debug!("Loaded metadata buffer of {} bytes", buffer.len());
        self.metadata_buffer = Some(buffer);
        Ok(())
    }

    /// Loads files to pack; a file replaces an earlier one with the same name
    pub fn load_associated_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<()> {
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                return Err(ModelError::NotFound(path.to_path_buf()));
            }

            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| ModelError::MissingAssociatedFile(path.display().to_string()))?
                .to_string();
            let contents = std::fs::read(path)?;
            debug!("Loaded associated file {} ({} bytes)", name, contents.len());

            self.associated_files.retain(|file| file.name != name);
            self.associated_files.push(PackedFile { name, contents });
        }

        Ok(())
    }

    /// Builds the populated model bytes
    pub fn populate(&self) -> Result<Vec<u8>> {
        let metadata_buffer = self
            .metadata_buffer
            .as_deref()
            .ok_or_else(|| {
                ModelError::MetadataMismatch("no metadata buffer was loaded".to_string())
            })?;
        let metadata = parse_metadata_buffer(metadata_buffer)?;

        self.check_metadata(&metadata)?;

        if self.model.has_external_buffers() {
            return Err(ModelError::Unsupported(
                "buffers stored outside the flatbuffer cannot be relocated".to_string(),
            ));
        }

        match &self.model_file {
            Some(path) => info!(
                "Populating {} with {} bytes of metadata and {} associated files",
                path.display(),
                metadata_buffer.len(),
                self.associated_files.len()
            ),
            None => info!(
                "Populating model buffer with {} bytes of metadata and {} associated files",
                metadata_buffer.len(),
                self.associated_files.len()
            ),
        }
        if self.model.has_packed_files() {
            warn!("Model already carries packed files; they are replaced");
        }

        let spliced = splice_metadata(self.model.flatbuffer(), metadata_buffer)?;

        // Read the result back before any archive goes on it.
        let check = TfliteModel::from_bytes(spliced.clone())?;
        if check.metadata_buffer(METADATA_FIELD_NAME)? != Some(metadata_buffer) {
            return Err(ModelError::InvalidModel(
                "populated model does not carry the metadata buffer".to_string(),
            ));
        }

        archive::append_archive(spliced, &self.associated_files)
    }

    /// Populates and writes the model to `path`
    ///
    /// The bytes go to a temporary file next to `path` that is renamed into
    /// place, so an existing file is either fully replaced or left untouched.
    /// Returns the bytes written.
    pub fn save_model_with_metadata(&self, path: impl AsRef<Path>) -> Result<Vec<u8>> {
        let path = path.as_ref();
        let bytes = self.populate()?;

        write_atomically(path, &bytes)?;
        info!("Wrote {} bytes to {}", bytes.len(), path.display());

        Ok(bytes)
    }

    fn check_metadata(&self, metadata: &ModelMetadata) -> Result<()> {
        let subgraphs = self.model.subgraphs();
        if metadata.subgraph_metadata.len() != subgraphs.len() {
            return Err(ModelError::MetadataMismatch(format!(
                "metadata describes {} subgraphs, the model has {}",
                metadata.subgraph_metadata.len(),
                subgraphs.len()
            )));
        }

        let pairs = metadata.subgraph_metadata.iter().zip(subgraphs);
        for (index, (described, actual)) in pairs.enumerate() {
            if described.input_tensor_metadata.len() != actual.inputs.len() {
                return Err(ModelError::MetadataMismatch(format!(
                    "subgraph {}: metadata describes {} input tensors, the model has {}",
                    index,
                    described.input_tensor_metadata.len(),
                    actual.inputs.len()
                )));
            }
            if described.output_tensor_metadata.len() != actual.outputs.len() {
                return Err(ModelError::MetadataMismatch(format!(
                    "subgraph {}: metadata describes {} output tensors, the model has {}",
                    index,
                    described.output_tensor_metadata.len(),
                    actual.outputs.len()
                )));
            }
        }

        let recorded: BTreeSet<&str> = metadata
            .all_associated_files()
            .map(|file| file.name.as_str())
            .collect();
        let supplied: BTreeSet<&str> = self
            .associated_files
            .iter()
            .map(|file| file.name.as_str())
            .collect();

        if let Some(missing) = recorded.difference(&supplied).next() {
            return Err(ModelError::MetadataMismatch(format!(
                "associated file {} is recorded in the metadata but was not supplied",
                missing
            )));
        }
        if let Some(extra) = supplied.difference(&recorded).next() {
            return Err(ModelError::MetadataMismatch(format!(
                "associated file {} was supplied but is not recorded in the metadata",
                extra
            )));
        }

        Ok(())
    }
}

/// Writes `bytes` to `path` through a temporary file in the same directory
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;

    Ok(())
}

/// Places a new root table carrying `metadata` in front of `model`
fn splice_metadata(model: &[u8], metadata: &[u8]) -> Result<Vec<u8>> {
    let root = flatbuf::root_table(model, Some(TFLITE_FILE_IDENTIFIER))?;

    // Fields past the known schema would be lost by the new root.
    let mut slot = vt::model::END;
    while slot < root.slot_end() {
        if root.field_position(slot)?.is_some() {
            return Err(ModelError::Unsupported(format!(
                "unknown model field at vtable offset {}",
                slot
            )));
        }
        slot += 2;
    }

    let version = root.u32(vt::model::VERSION, 0)?;

    let mut buffers: Vec<Target> = match root.vector(vt::model::BUFFERS)? {
        Some(vector) => (0..vector.len())
            .map(|i| vector.table_position(i).map(Target::Original))
            .collect::<std::result::Result<_, _>>()?,
        None => Vec::new(),
    };

    let mut entries: Vec<Target> = Vec::new();
    let mut reused_buffer: Option<usize> = None;
    if let Some(vector) = root.vector(vt::model::METADATA)? {
        for entry in vector.tables()? {
            if entry.string(vt::metadata::NAME)? == Some(METADATA_FIELD_NAME) {
                let index = entry.u32(vt::metadata::BUFFER, 0)? as usize;
                debug!("Dropping previous {} entry (buffer {})", METADATA_FIELD_NAME, index);
                if index > 0 && index < buffers.len() {
                    reused_buffer = Some(index);
                }
                continue;
            }
            entries.push(Target::Original(entry.location()));
        }
    }

    let passthrough: Vec<(VOffsetT, usize)> = vt::model::PASSTHROUGH
        .iter()
        .filter_map(|slot| root.target(*slot).map(|t| t.map(|pos| (*slot, pos))).transpose())
        .collect::<std::result::Result<_, _>>()?;

    let mut offset_slots: Vec<VOffsetT> = passthrough.iter().map(|(slot, _)| *slot).collect();
    offset_slots.push(vt::model::BUFFERS);
    offset_slots.push(vt::model::METADATA);
    offset_slots.sort_unstable();

    let mut w = ByteWriter::new();
    let mut patches: Vec<(usize, Target)> = Vec::new();

    let root_offset = w.placeholder();
    w.push_bytes(TFLITE_FILE_IDENTIFIER.as_bytes());

    // Model vtable: version at +4, offset fields from +8 in slot order.
    let model_vtable = w.len();
    w.push_u16(vt::model::END);
    w.push_u16((8 + 4 * offset_slots.len()) as u16);
    let mut slot = vt::model::VERSION;
    while slot < vt::model::END {
        let field = if slot == vt::model::VERSION {
            4
        } else {
            offset_slots
                .iter()
                .position(|s| *s == slot)
                .map_or(0, |index| 8 + 4 * index as u16)
        };
        w.push_u16(field);
        slot += 2;
    }

    w.align(4);
    let model_table = w.len();
    w.patch_uoffset(root_offset, model_table);
    w.push_i32((model_table - model_vtable) as i32);
    w.push_u32(version);
    let mut buffers_field = 0;
    let mut metadata_field = 0;
    for slot in &offset_slots {
        let at = w.placeholder();
        match *slot {
            vt::model::BUFFERS => buffers_field = at,
            vt::model::METADATA => metadata_field = at,
            other => {
                if let Some((_, pos)) = passthrough.iter().find(|(s, _)| *s == other) {
                    patches.push((at, Target::Original(*pos)));
                }
            }
        }
    }

    // The new Buffer takes the dropped entry's slot or goes at the end.
    let buffer_index = reused_buffer.unwrap_or(buffers.len());
    let buffers_vector = w.len();
    patches.push((buffers_field, Target::Prefix(buffers_vector)));
    let buffer_count = buffers.len().max(buffer_index + 1);
    w.push_u32(buffer_count as u32);
    let mut buffer_elements = Vec::with_capacity(buffer_count);
    for _ in 0..buffer_count {
        buffer_elements.push(w.placeholder());
    }

    let metadata_vector = w.len();
    patches.push((metadata_field, Target::Prefix(metadata_vector)));
    w.push_u32((entries.len() + 1) as u32);
    let mut entry_elements = Vec::with_capacity(entries.len() + 1);
    for _ in 0..=entries.len() {
        entry_elements.push(w.placeholder());
    }

    // Metadata entry: name, buffer index.
    let entry_vtable = w.len();
    w.push_u16(8);
    w.push_u16(12);
    w.push_u16(4);
    w.push_u16(8);
    let entry_table = w.len();
    w.push_i32((entry_table - entry_vtable) as i32);
    let entry_name = w.placeholder();
    w.push_u32(buffer_index as u32);
    entries.push(Target::Prefix(entry_table));

    // Buffer: data only.
    let buffer_vtable = w.len();
    w.push_u16(6);
    w.push_u16(8);
    w.push_u16(4);
    w.align(4);
    let buffer_table = w.len();
    w.push_i32((buffer_table - buffer_vtable) as i32);
    let buffer_data = w.placeholder();
    if buffer_index < buffers.len() {
        buffers[buffer_index] = Target::Prefix(buffer_table);
    } else {
        buffers.push(Target::Prefix(buffer_table));
    }

    let name = w.push_string(METADATA_FIELD_NAME);
    w.patch_uoffset(entry_name, name);

    w.align_after(4, BUFFER_ALIGNMENT);
    let data = w.len();
    w.patch_uoffset(buffer_data, data);
    w.push_u32(metadata.len() as u32);
    w.push_bytes(metadata);

    w.align(BUFFER_ALIGNMENT);
    let prefix_len = w.len();

    patches.extend(buffer_elements.into_iter().zip(buffers));
    patches.extend(entry_elements.into_iter().zip(entries));
    for (at, target) in patches {
        match target {
            Target::Original(pos) => w.patch_uoffset(at, prefix_len + pos),
            Target::Prefix(pos) => w.patch_uoffset(at, pos),
        }
    }

    debug!(
        "Spliced metadata: prefix {} bytes, buffer index {}, metadata at {}",
        prefix_len, buffer_index, data
    );

    let mut bytes = w.into_bytes();
    bytes.extend_from_slice(model);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{build_classifier_model, classifier_metadata, ClassifierSpec};
    use crate::metadata::create_metadata_buffer;

    fn labels_file(dir: &Path) -> PathBuf {
        let path = dir.join("labels.txt");
        std::fs::write(&path, "healthy\nblight").unwrap();
        path
    }

    fn populator(spec: &ClassifierSpec, dir: &Path) -> MetadataPopulator {
        let mut populator =
            MetadataPopulator::with_model_buffer(build_classifier_model(spec)).unwrap();
        populator
            .load_metadata_buffer(create_metadata_buffer(&classifier_metadata(1, 1)))
            .unwrap();
        populator.load_associated_files(&[labels_file(dir)]).unwrap();
        populator
    }

    #[test]
    fn metadata_is_embedded_and_original_is_kept_intact() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ClassifierSpec::default();
        let original = build_classifier_model(&spec);

        let populated = populator(&spec, dir.path()).populate().unwrap();
        let model = TfliteModel::from_bytes(populated.clone()).unwrap();

        let metadata = model.metadata_buffer(METADATA_FIELD_NAME).unwrap().unwrap();
        let expected = create_metadata_buffer(&classifier_metadata(1, 1));
        assert_eq!(
            parse_metadata_buffer(metadata).unwrap(),
            parse_metadata_buffer(&expected).unwrap()
        );
        assert_eq!(model.buffer_count(), 3);
        assert_eq!(model.subgraphs()[0].outputs[0].shape, vec![1, 10]);
        assert_eq!(archive::list_files(&populated).unwrap(), vec!["labels.txt".to_string()]);

        let prefix = populated
            .windows(original.len())
            .position(|window| window == original.as_slice())
            .unwrap();
        assert_eq!(prefix % BUFFER_ALIGNMENT, 0);
    }

    #[test]
    fn metadata_data_is_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let populated = populator(&ClassifierSpec::default(), dir.path()).populate().unwrap();

        let root = flatbuf::root_table(&populated, Some(TFLITE_FILE_IDENTIFIER)).unwrap();
        let buffers = root.vector(vt::model::BUFFERS).unwrap().unwrap();
        let last = buffers.table(buffers.len() - 1).unwrap();
        let data = last.vector(vt::buffer::DATA).unwrap().unwrap();
        assert_eq!(data.data_position() % BUFFER_ALIGNMENT, 0);
    }

    #[test]
    fn other_metadata_entries_survive() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ClassifierSpec {
            extra_metadata: vec![("min_runtime_version".to_string(), b"1.5.0".to_vec())],
            ..Default::default()
        };

        let populated = populator(&spec, dir.path()).populate().unwrap();
        let model = TfliteModel::from_bytes(populated).unwrap();

        let names: Vec<&str> = model.metadata_entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["min_runtime_version", METADATA_FIELD_NAME]);
        assert_eq!(model.metadata_buffer("min_runtime_version").unwrap(), Some(&b"1.5.0"[..]));
    }

    #[test]
    fn repopulating_replaces_metadata_and_archive() {
        let dir = tempfile::tempdir().unwrap();
        let first = populator(&ClassifierSpec::default(), dir.path()).populate().unwrap();
        let first_model = TfliteModel::from_bytes(first.clone()).unwrap();

        let mut again = MetadataPopulator::with_model_buffer(first).unwrap();
        let mut renamed = classifier_metadata(1, 1);
        renamed.name = Some("Second pass".to_string());
        again.load_metadata_buffer(create_metadata_buffer(&renamed)).unwrap();
        again.load_associated_files(&[labels_file(dir.path())]).unwrap();
        let second = again.populate().unwrap();

        let model = TfliteModel::from_bytes(second.clone()).unwrap();
        assert_eq!(model.metadata_entries().len(), 1);
        assert_eq!(model.buffer_count(), first_model.buffer_count());
        let buffer = model.metadata_buffer(METADATA_FIELD_NAME).unwrap().unwrap();
        let metadata = parse_metadata_buffer(buffer).unwrap();
        assert_eq!(metadata.name.as_deref(), Some("Second pass"));
        assert_eq!(archive::list_files(&second).unwrap(), vec!["labels.txt".to_string()]);
    }

    #[test]
    fn tensor_count_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let model = build_classifier_model(&ClassifierSpec::default());
        let mut populator = MetadataPopulator::with_model_buffer(model).unwrap();
        populator
            .load_metadata_buffer(create_metadata_buffer(&classifier_metadata(2, 1)))
            .unwrap();
        populator.load_associated_files(&[labels_file(dir.path())]).unwrap();

        let err = populator.populate().unwrap_err();
        assert!(matches!(err, ModelError::MetadataMismatch(_)));
    }

    #[test]
    fn recorded_files_must_be_supplied() {
        let model = build_classifier_model(&ClassifierSpec::default());
        let mut populator = MetadataPopulator::with_model_buffer(model).unwrap();
        populator
            .load_metadata_buffer(create_metadata_buffer(&classifier_metadata(1, 1)))
            .unwrap();

        let err = populator.populate().unwrap_err();
        assert!(matches!(err, ModelError::MetadataMismatch(msg) if msg.contains("labels.txt")));
    }

    #[test]
    fn unrecorded_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut populator = populator(&ClassifierSpec::default(), dir.path());
        let extra = dir.path().join("notes.txt");
        std::fs::write(&extra, "notes").unwrap();
        populator.load_associated_files(&[extra]).unwrap();

        let err = populator.populate().unwrap_err();
        assert!(matches!(err, ModelError::MetadataMismatch(msg) if msg.contains("notes.txt")));
    }

    #[test]
    fn external_buffers_are_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ClassifierSpec {
            external_weights: true,
            ..Default::default()
        };

        let err = populator(&spec, dir.path()).populate().unwrap_err();
        assert!(matches!(err, ModelError::Unsupported(_)));
    }

    #[test]
    fn save_replaces_the_destination_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.tflite");
        std::fs::write(&output, b"stale").unwrap();

        let written = populator(&ClassifierSpec::default(), dir.path())
            .save_model_with_metadata(&output)
            .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), written);
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 2);
    }

    #[test]
    fn failed_populate_leaves_the_destination_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.tflite");

        let model = build_classifier_model(&ClassifierSpec::default());
        let mut populator = MetadataPopulator::with_model_buffer(model).unwrap();
        populator
            .load_metadata_buffer(create_metadata_buffer(&classifier_metadata(1, 1)))
            .unwrap();
        assert!(populator.save_model_with_metadata(&output).is_err());
        assert!(!output.exists());
    }

    #[test]
    fn populating_twice_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let first = populator(&ClassifierSpec::default(), dir.path()).populate().unwrap();
        let second = populator(&ClassifierSpec::default(), dir.path()).populate().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn garbage_metadata_buffer_is_rejected_on_load() {
        let model = build_classifier_model(&ClassifierSpec::default());
        let mut populator = MetadataPopulator::with_model_buffer(model).unwrap();
        assert!(populator.load_metadata_buffer(b"not a flatbuffer".to_vec()).is_err());
    }
}
