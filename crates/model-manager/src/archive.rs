//! Packed associated files
//!
//! Associated files travel as an uncompressed zip archive appended to the
//! model flatbuffer. Entry offsets are absolute file offsets, so the whole
//! model file opens as a zip archive.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{ModelError, Result};

/// A file to pack, by archive name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedFile {
    pub name: String,
    pub contents: Vec<u8>,
}

/// Finds where an appended archive starts, if the bytes end with one
pub fn archive_start(bytes: &[u8]) -> Option<usize> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).ok()?;

    let mut start: Option<u64> = None;
    for index in 0..archive.len() {
        let header_start = archive.by_index_raw(index).ok()?.header_start();
        start = Some(start.map_or(header_start, |s| s.min(header_start)));
    }

    start.map(|s| s as usize).filter(|s| *s >= 8 && *s < bytes.len())
}

/// Appends the files to `model` as a stored zip archive
pub fn append_archive(model: Vec<u8>, files: &[PackedFile]) -> Result<Vec<u8>> {
    if files.is_empty() {
        return Ok(model);
    }

    let mut cursor = Cursor::new(model);
    cursor.seek(SeekFrom::End(0))?;

    // Fixed timestamps keep repeated runs byte-identical.
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(zip::DateTime::default());
    let mut writer = ZipWriter::new(cursor);
    for file in files {
        debug!("Packing {} ({} bytes)", file.name, file.contents.len());
        writer.start_file(file.name.as_str(), options)?;
        writer.write_all(&file.contents)?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Names of the packed files, in archive order
pub fn list_files(bytes: &[u8]) -> Result<Vec<String>> {
    if archive_start(bytes).is_none() {
        return Ok(Vec::new());
    }

    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut names = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        names.push(archive.by_index_raw(index)?.name().to_string());
    }

    Ok(names)
}

/// Contents of one packed file
pub fn read_file(bytes: &[u8], name: &str) -> Result<Vec<u8>> {
    if archive_start(bytes).is_none() {
        return Err(ModelError::MissingAssociatedFile(name.to_string()));
    }

    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(ModelError::MissingAssociatedFile(name.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let mut contents = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut contents)?;
    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_bytes() -> Vec<u8> {
        let mut bytes = vec![0u8; 64];
        bytes[4..8].copy_from_slice(b"TFL3");
        bytes
    }

    fn labels() -> PackedFile {
        PackedFile {
            name: "labels.txt".to_string(),
            contents: b"healthy\nblight".to_vec(),
        }
    }

    #[test]
    fn plain_bytes_have_no_archive() {
        assert_eq!(archive_start(&model_bytes()), None);
        assert!(list_files(&model_bytes()).unwrap().is_empty());
    }

    #[test]
    fn archive_starts_right_after_the_model() {
        let packed = append_archive(model_bytes(), &[labels()]).unwrap();

        assert_eq!(&packed[..64], &model_bytes()[..]);
        assert_eq!(archive_start(&packed), Some(64));
        assert_eq!(list_files(&packed).unwrap(), vec!["labels.txt".to_string()]);
        assert_eq!(read_file(&packed, "labels.txt").unwrap(), b"healthy\nblight".to_vec());
    }

    #[test]
    fn missing_entry_is_reported_by_name() {
        let packed = append_archive(model_bytes(), &[labels()]).unwrap();
        let err = read_file(&packed, "vocab.txt").unwrap_err();
        assert!(matches!(err, ModelError::MissingAssociatedFile(name) if name == "vocab.txt"));
    }

    #[test]
    fn packing_is_deterministic() {
        let first = append_archive(model_bytes(), &[labels()]).unwrap();
        let second = append_archive(model_bytes(), &[labels()]).unwrap();
        assert_eq!(first, second);
    }
}
