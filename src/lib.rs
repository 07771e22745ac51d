//! KilimoVision metadata attacher
//!
//! This crate attaches descriptive metadata and class labels to the
//! KilimoVision tomato disease classifier. It ties the configuration, the
//! metadata descriptor tree and the TFLite container together and reports
//! the outcome of a run.

pub mod attacher;
pub mod outcome;

// Re-export commonly used types
pub use attacher::MetadataAttacher;
pub use outcome::{AttachOutcome, MergeReport, Stage, Verification, VerifiedMetadata};
