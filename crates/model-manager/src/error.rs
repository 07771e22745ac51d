use std::path::PathBuf;

use thiserror::Error;

use crate::flatbuf::FlatbufferError;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Malformed flatbuffer: {0}")]
    Flatbuffer(#[from] FlatbufferError),
    #[error("Invalid model: {0}")]
    InvalidModel(String),
    #[error("Unsupported model: {0}")]
    Unsupported(String),
    #[error("Metadata does not match the model: {0}")]
    MetadataMismatch(String),
    #[error("The model has no {0} metadata")]
    MissingMetadata(&'static str),
    #[error("Associated file \"{0}\" is not packed in the model")]
    MissingAssociatedFile(String),
    #[error("Zip error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;

impl From<ModelError> for common::Error {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::MetadataMismatch(_) => common::Error::Validation(err.to_string()),
            other => common::Error::Merge(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_maps_to_validation_and_the_rest_to_merge() {
        let validation: common::Error = ModelError::MetadataMismatch("2 inputs".into()).into();
        assert!(validation.is_validation());

        let merge: common::Error =
            ModelError::NotFound(PathBuf::from("KilimoVision.tflite")).into();
        assert!(merge.is_merge());
        assert!(merge.to_string().contains("KilimoVision.tflite"));
    }
}
