//! The analysis document and its string-blob codec.
//!
//! The worker returns the document as an opaque string; [`encode`] and
//! [`decode`] define that blob as canonical JSON. A blob that does not
//! decode cleanly is rejected wholesale; a partially-populated document
//! is never produced.

use serde::{Deserialize, Serialize};

/// A node of the extracted call graph, typically a type or method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Stable identifier, unique within the document.
    pub id: String,

    /// Display caption, when the analyzer produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Id of the calling node.
    pub source: String,
    /// Id of the called node.
    pub target: String,
}

/// A grouping of nodes, typically one package of the spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// Stable identifier, unique within the document.
    pub id: String,

    /// Display caption, when the analyzer produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Ids of the nodes contained in this cluster.
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// The result of one package analysis. Immutable once produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisDocument {
    #[serde(default)]
    pub nodes: Vec<Node>,

    #[serde(default)]
    pub edges: Vec<Edge>,

    #[serde(default)]
    pub clusters: Vec<Cluster>,

    /// Items the analyzer could not load or resolve.
    #[serde(default)]
    pub failures: Vec<String>,
}

/// Encode a document into the wire blob.
pub fn encode(document: &AnalysisDocument) -> Result<String, serde_json::Error> {
    serde_json::to_string(document)
}

/// Decode a wire blob into a document.
pub fn decode(blob: &str) -> Result<AnalysisDocument, serde_json::Error> {
    serde_json::from_str(blob)
}
