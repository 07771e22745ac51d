//! TFLite model container for KilimoVision tooling
//!
//! This crate reads TFLite model files, serializes model metadata into the
//! TFLite metadata schema, embeds it into a model together with packed
//! associated files, and reads it back out.

pub mod archive;
pub mod displayer;
pub mod error;
pub mod flatbuf;
pub mod loader;
pub mod metadata;
pub mod populator;
pub mod schema;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

// Re-export commonly used types
pub use displayer::MetadataDisplayer;
pub use error::{ModelError, Result};
pub use loader::{SubgraphInfo, TensorInfo, TfliteModel};
pub use metadata::{create_metadata_buffer, metadata_to_json, parse_metadata_buffer};
pub use populator::{write_atomically, MetadataPopulator};
