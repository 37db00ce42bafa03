//! Analysis payload types.
//!
//! What the client sends (a packaging spec and a scratch output path) and
//! what it gets back (the decoded analysis document). The inspection
//! itself happens in the worker; these types only cross the boundary.

pub mod document;
pub mod spec;

use std::path::PathBuf;

pub use document::{AnalysisDocument, Cluster, Edge, Node};

/// A single analysis job.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Packaging spec describing the assemblies and types to inspect.
    /// Replaced by its gzip-compressed form before transmission.
    pub spec: Vec<u8>,

    /// Scratch file the worker may write while producing the document.
    /// Removed when the session ends, whatever the outcome.
    pub output_file: PathBuf,
}

impl AnalysisRequest {
    /// Create a request from a raw (uncompressed) spec.
    pub fn new(spec: impl Into<Vec<u8>>, output_file: impl Into<PathBuf>) -> Self {
        Self {
            spec: spec.into(),
            output_file: output_file.into(),
        }
    }
}
