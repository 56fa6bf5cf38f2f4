//! Saving and loading provenance graphs
//!
//! An artifact is a self-contained [`GraphDocument`] (format version, node
//! records, edge records with every attribute). `.json` paths are written as
//! pretty JSON; any other path as MessagePack with named fields.
//!
//! Saving over an existing artifact replaces it and logs a warning.
//!
//! [`GraphDocument`]: crate::provenance_graph::GraphDocument

use crate::provenance_graph::{GraphDocument, GraphError, ProvenanceGraph};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while saving or loading a graph
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("graph artifact not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to encode graph: {0}")]
    Encode(String),

    #[error("failed to decode graph: {0}")]
    Decode(String),

    #[error("invalid graph artifact: {0}")]
    InvalidGraph(#[from] GraphError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for persistence operations
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// On-disk encoding of a graph artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Json,
    MessagePack,
}

impl GraphFormat {
    /// `.json` is JSON, everything else MessagePack
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => GraphFormat::Json,
            _ => GraphFormat::MessagePack,
        }
    }
}

/// What [`save_graph`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Overwritten,
}

pub fn encode_graph(graph: &ProvenanceGraph, format: GraphFormat) -> Result<Vec<u8>> {
    let document = graph.to_document();
    match format {
        GraphFormat::Json => {
            serde_json::to_vec_pretty(&document).map_err(|e| PersistenceError::Encode(e.to_string()))
        }
        GraphFormat::MessagePack => {
            rmp_serde::to_vec_named(&document).map_err(|e| PersistenceError::Encode(e.to_string()))
        }
    }
}

pub fn decode_graph(bytes: &[u8], format: GraphFormat) -> Result<ProvenanceGraph> {
    let document: GraphDocument = match format {
        GraphFormat::Json => {
            serde_json::from_slice(bytes).map_err(|e| PersistenceError::Decode(e.to_string()))?
        }
        GraphFormat::MessagePack => {
            rmp_serde::from_slice(bytes).map_err(|e| PersistenceError::Decode(e.to_string()))?
        }
    };
    Ok(ProvenanceGraph::from_document(document)?)
}

/// Write the full graph to `path`, replacing any existing artifact
///
/// Missing parent directories are created. Replacing an existing file logs a
/// warning.
///
/// # Arguments
///
/// * `graph` - Graph to persist, nodes and edges with all attributes
/// * `path` - Destination; a `.json` extension selects JSON, anything else
///   MessagePack
///
/// # Returns
///
/// [`SaveOutcome::Overwritten`] if a file was already at `path`, otherwise
/// [`SaveOutcome::Created`].
///
/// # Errors
///
/// Returns [`PersistenceError::Encode`] if the graph cannot be serialized and
/// [`PersistenceError::Io`] if the directory or file cannot be written.
///
/// # Example
///
/// ```
/// use rastro::persistence::{load_graph, save_graph, SaveOutcome};
/// use rastro::provenance_graph::{EdgeKind, ProvenanceGraph};
///
/// # fn main() -> anyhow::Result<()> {
/// let dir = tempfile::tempdir()?;
/// let path = dir.path().join("run.json");
///
/// let mut graph = ProvenanceGraph::new();
/// graph.ensure_edge("eval.f", "eval.g", EdgeKind::Call);
/// assert_eq!(save_graph(&graph, &path)?, SaveOutcome::Created);
/// assert_eq!(save_graph(&graph, &path)?, SaveOutcome::Overwritten);
///
/// assert_eq!(load_graph(&path)?, graph);
/// # Ok(())
/// # }
/// ```
pub fn save_graph(graph: &ProvenanceGraph, path: impl AsRef<Path>) -> Result<SaveOutcome> {
    let path = path.as_ref();
    let bytes = encode_graph(graph, GraphFormat::from_path(path))?;

    let outcome = if path.exists() {
        tracing::warn!("graph artifact {} already exists; overwriting", path.display());
        SaveOutcome::Overwritten
    } else {
        SaveOutcome::Created
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    tracing::debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "saved graph to {}",
        path.display()
    );
    Ok(outcome)
}

/// Read a graph written by [`save_graph`]
///
/// # Errors
///
/// Returns [`PersistenceError::FileNotFound`] for a missing path,
/// [`PersistenceError::Decode`] for bytes that are not a graph document, and
/// [`PersistenceError::InvalidGraph`] for a document with the wrong version.
pub fn load_graph(path: impl AsRef<Path>) -> Result<ProvenanceGraph> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PersistenceError::FileNotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;
    decode_graph(&bytes, GraphFormat::from_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::provenance_graph::{EdgeAttr, EdgeKind, NodeAttrs};
    use tempfile::TempDir;

    fn sample_graph() -> ProvenanceGraph {
        let mut g = ProvenanceGraph::new();
        g.ensure_node("eval.f", NodeAttrs::call());
        g.bump_invocation("eval.f");
        g.ensure_edge("eval.f", "eval.g", EdgeKind::Call);
        g.increment_edge_weight("eval.f", "eval.g", EdgeKind::Call);
        g.set_edge_attr("eval.f", "eval.g", EdgeKind::Call, EdgeAttr::LastArgs("ndarray(3,)".into()));
        g.ensure_node(
            "eval.g.x#0123456789ab",
            NodeAttrs::value("ndarray", Fingerprint::of_bytes(b"x"), Some(vec![3])),
        );
        g.ensure_edge("eval.g", "eval.g.x#0123456789ab", EdgeKind::Value);
        g
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(GraphFormat::from_path(Path::new("g.json")), GraphFormat::Json);
        assert_eq!(GraphFormat::from_path(Path::new("g.msgpack")), GraphFormat::MessagePack);
        assert_eq!(GraphFormat::from_path(Path::new("graph")), GraphFormat::MessagePack);
    }

    #[test]
    fn test_round_trip_both_formats() {
        let dir = TempDir::new().unwrap();
        let graph = sample_graph();
        for name in ["graph.json", "graph.msgpack"] {
            let path = dir.path().join(name);
            assert_eq!(save_graph(&graph, &path).unwrap(), SaveOutcome::Created);
            assert_eq!(load_graph(&path).unwrap(), graph);
        }
    }

    #[test]
    fn test_existing_artifact_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        save_graph(&ProvenanceGraph::new(), &path).unwrap();
        assert_eq!(save_graph(&sample_graph(), &path).unwrap(), SaveOutcome::Overwritten);
        assert_eq!(load_graph(&path).unwrap().node_count(), 3);
    }

    #[test]
    fn test_missing_file() {
        let err = load_graph("/nonexistent/graph.json").unwrap_err();
        assert!(matches!(err, PersistenceError::FileNotFound(_)));
    }

    #[test]
    fn test_corrupt_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(load_graph(&path), Err(PersistenceError::Decode(_))));
    }
}
