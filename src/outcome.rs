//! Results of an attachment run

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::models::ModelMetadata;

/// Step at which a run fell back to writing only the labels file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Building the descriptor tree
    Construction,
    /// Loading, populating or saving the model
    Merge,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Construction => write!(f, "creating metadata"),
            Stage::Merge => write!(f, "saving model with metadata"),
        }
    }
}

/// What the merge step wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// Model with metadata
    pub output_path: PathBuf,

    /// Size of the written model
    pub bytes: usize,

    /// Hex SHA-256 of the written model
    pub sha256: String,

    /// Size of the embedded metadata flatbuffer
    pub metadata_bytes: usize,

    /// Files packed into the model
    pub packed_files: Vec<String>,

    /// Time spent loading, populating and saving
    pub elapsed: Duration,
}

/// Metadata read back from the written model
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedMetadata {
    /// Pretty-printed metadata JSON
    pub json: String,

    /// Names of the packed files
    pub packed_files: Vec<String>,

    /// Parsed descriptor tree
    pub metadata: ModelMetadata,
}

/// Result of reading the output model back
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    Verified(VerifiedMetadata),
    /// Disabled in the configuration
    Skipped,
    /// Reading back failed or disagreed with what was written
    Failed(String),
}

/// Final state of a run
#[derive(Debug)]
pub enum AttachOutcome {
    /// The model with metadata and the labels file were written
    Completed {
        labels_path: PathBuf,
        report: MergeReport,
        verification: Verification,
    },

    /// Only the labels file was written
    Fallback {
        labels_path: PathBuf,
        stage: Stage,
        error: common::Error,
    },
}

impl AttachOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, AttachOutcome::Completed { .. })
    }

    /// Path of the labels file, written in every outcome
    pub fn labels_path(&self) -> &Path {
        match self {
            AttachOutcome::Completed { labels_path, .. }
            | AttachOutcome::Fallback { labels_path, .. } => labels_path,
        }
    }
}
