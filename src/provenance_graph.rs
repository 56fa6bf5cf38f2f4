//! Provenance graph: calls, logged values and their relations
//!
//! An append/increment-only directed multigraph. Edges are keyed by
//! `(source, target, kind)`, so a call edge and a sibling edge between the same
//! pair of nodes are independent. Nothing is removed individually; [`clear`]
//! resets everything.
//!
//! ```text
//!        ┌──────── call (weight, last_args) ────────┐
//!        │                                          ▼
//!   render_0 ── call ──▶ sample_0 ── sibling ──▶ sample_1
//!                          │
//!                          └── value ──▶ sample_0.rays#3f2a9c01b7de
//! ```
//!
//! Successor order is the order in which the first edge to each successor was
//! added. The most recently added successor per `(node, kind)` is tracked
//! separately, so the tracer finds a caller's latest child in constant time.
//!
//! [`clear`]: ProvenanceGraph::clear

use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Format version written into persisted graph documents
pub const GRAPH_FORMAT_VERSION: u32 = 1;

/// Errors raised when rebuilding a graph from a document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("edge {src} -> {dst} references unknown node '{missing}'")]
    DanglingEdge {
        src: String,
        dst: String,
        missing: String,
    },

    #[error("duplicate node '{0}'")]
    DuplicateNode(String),

    #[error("graph format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Relation an edge records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Caller invoked callee
    Call,
    /// Temporal order between two children of the same caller
    Sibling,
    /// A call consumed or produced a value
    Value,
}

/// Attributes of a call or value node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAttrs {
    /// Invocations entering this node (zero for value nodes)
    pub invocation_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<usize>>,
}

impl NodeAttrs {
    /// Fresh call node, not yet invoked
    pub fn call() -> Self {
        Self::default()
    }

    /// Leaf value node
    pub fn value(
        value_type: impl Into<String>,
        fingerprint: Fingerprint,
        shape: Option<Vec<usize>>,
    ) -> Self {
        Self {
            invocation_count: 0,
            value_type: Some(value_type.into()),
            fingerprint: Some(fingerprint),
            shape,
        }
    }

    pub fn is_value(&self) -> bool {
        self.value_type.is_some()
    }
}

/// Attributes of an edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeAttrs {
    pub weight: u64,
    /// Argument summary of the most recent call along this edge
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_args: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
}

impl Default for EdgeAttrs {
    fn default() -> Self {
        Self {
            weight: 1,
            last_args: String::new(),
            relationship: None,
            fingerprint: None,
            value_type: None,
        }
    }
}

/// Single attribute update for [`ProvenanceGraph::set_edge_attr`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeAttr {
    LastArgs(String),
    Relationship(String),
    Fingerprint(Fingerprint),
    ValueType(String),
}

/// Borrowed view of one edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeRef<'a> {
    pub src: &'a str,
    pub dst: &'a str,
    pub kind: EdgeKind,
    pub attrs: &'a EdgeAttrs,
}

#[derive(Debug, Clone, PartialEq)]
struct NodeEntry {
    id: String,
    attrs: NodeAttrs,
}

#[derive(Debug, Clone, PartialEq)]
struct EdgeEntry {
    src: usize,
    dst: usize,
    kind: EdgeKind,
    attrs: EdgeAttrs,
}

/// Serialized form of a [`ProvenanceGraph`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub version: u32,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    #[serde(flatten)]
    pub attrs: NodeAttrs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub src: String,
    pub dst: String,
    pub kind: EdgeKind,
    #[serde(flatten)]
    pub attrs: EdgeAttrs,
}

/// Directed multigraph of calls and values for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "GraphDocument", try_from = "GraphDocument")]
pub struct ProvenanceGraph {
    nodes: Vec<NodeEntry>,
    node_index: HashMap<String, usize>,
    edges: Vec<EdgeEntry>,
    edge_index: HashMap<(usize, usize, EdgeKind), usize>,
    /// Outgoing edge indices per node, in insertion order
    outgoing: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
    /// Target of the newest edge per `(source, kind)`
    latest: HashMap<(usize, EdgeKind), usize>,
}

impl ProvenanceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.node_index.get(id).copied()
    }

    fn intern(&mut self, id: &str, attrs: NodeAttrs) -> (usize, bool) {
        if let Some(idx) = self.index_of(id) {
            return (idx, false);
        }
        let idx = self.nodes.len();
        self.nodes.push(NodeEntry {
            id: id.to_string(),
            attrs,
        });
        self.node_index.insert(id.to_string(), idx);
        self.outgoing.push(Vec::new());
        self.in_degree.push(0);
        (idx, true)
    }

    /// Create the node with `attrs` unless it exists
    ///
    /// Returns `true` if the node was created.
    pub fn ensure_node(&mut self, id: &str, attrs: NodeAttrs) -> bool {
        self.intern(id, attrs).1
    }

    /// Increment the invocation count, returning the new count
    pub fn bump_invocation(&mut self, id: &str) -> Option<u64> {
        let idx = self.index_of(id)?;
        let attrs = &mut self.nodes[idx].attrs;
        attrs.invocation_count += 1;
        Some(attrs.invocation_count)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&NodeAttrs> {
        self.index_of(id).map(|idx| &self.nodes[idx].attrs)
    }

    fn edge_slot(&self, src: &str, dst: &str, kind: EdgeKind) -> Option<usize> {
        let key = (self.index_of(src)?, self.index_of(dst)?, kind);
        self.edge_index.get(&key).copied()
    }

    /// Create the edge with weight 1 unless it exists
    ///
    /// Missing endpoints are created as plain call nodes. Returns `true` if the
    /// edge already existed, so the caller can decide between increment and
    /// create.
    pub fn ensure_edge(&mut self, src: &str, dst: &str, kind: EdgeKind) -> bool {
        let (s, _) = self.intern(src, NodeAttrs::call());
        let (d, _) = self.intern(dst, NodeAttrs::call());
        if self.edge_index.contains_key(&(s, d, kind)) {
            return true;
        }
        let idx = self.edges.len();
        self.edges.push(EdgeEntry {
            src: s,
            dst: d,
            kind,
            attrs: EdgeAttrs::default(),
        });
        self.edge_index.insert((s, d, kind), idx);
        self.outgoing[s].push(idx);
        self.in_degree[d] += 1;
        self.latest.insert((s, kind), d);
        false
    }

    pub fn has_edge(&self, src: &str, dst: &str, kind: EdgeKind) -> bool {
        self.edge_slot(src, dst, kind).is_some()
    }

    pub fn edge(&self, src: &str, dst: &str, kind: EdgeKind) -> Option<&EdgeAttrs> {
        self.edge_slot(src, dst, kind).map(|idx| &self.edges[idx].attrs)
    }

    /// Increment an edge's weight, returning the new weight
    pub fn increment_edge_weight(&mut self, src: &str, dst: &str, kind: EdgeKind) -> Option<u64> {
        let idx = self.edge_slot(src, dst, kind)?;
        let attrs = &mut self.edges[idx].attrs;
        attrs.weight += 1;
        Some(attrs.weight)
    }

    /// Overwrite one attribute of an existing edge
    ///
    /// Returns `false` if the edge does not exist.
    pub fn set_edge_attr(&mut self, src: &str, dst: &str, kind: EdgeKind, attr: EdgeAttr) -> bool {
        let Some(idx) = self.edge_slot(src, dst, kind) else {
            return false;
        };
        let attrs = &mut self.edges[idx].attrs;
        match attr {
            EdgeAttr::LastArgs(s) => attrs.last_args = s,
            EdgeAttr::Relationship(s) => attrs.relationship = Some(s),
            EdgeAttr::Fingerprint(fp) => attrs.fingerprint = Some(fp),
            EdgeAttr::ValueType(s) => attrs.value_type = Some(s),
        }
        true
    }

    fn successor_indices(&self, id: &str, kind: Option<EdgeKind>) -> Vec<usize> {
        let Some(idx) = self.index_of(id) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        for &edge in &self.outgoing[idx] {
            let entry = &self.edges[edge];
            if kind.is_some_and(|k| k != entry.kind) {
                continue;
            }
            if seen.insert(entry.dst) {
                ordered.push(entry.dst);
            }
        }
        ordered
    }

    /// Successor most recently added through an edge of `kind`
    ///
    /// Equal to `successors_of_kind(id, kind).last()`, without walking the
    /// outgoing edges.
    pub fn latest_successor(&self, id: &str, kind: EdgeKind) -> Option<&str> {
        let idx = self.index_of(id)?;
        self.latest
            .get(&(idx, kind))
            .map(|&dst| self.nodes[dst].id.as_str())
    }

    /// Distinct successors over all edge kinds, in insertion order
    pub fn successors(&self, id: &str) -> Vec<&str> {
        self.successor_indices(id, None)
            .into_iter()
            .map(|idx| self.nodes[idx].id.as_str())
            .collect()
    }

    /// Successors reached through edges of one kind, in insertion order
    pub fn successors_of_kind(&self, id: &str, kind: EdgeKind) -> Vec<&str> {
        self.successor_indices(id, Some(kind))
            .into_iter()
            .map(|idx| self.nodes[idx].id.as_str())
            .collect()
    }

    /// Number of incoming edges of any kind
    pub fn in_degree(&self, id: &str) -> usize {
        self.index_of(id).map_or(0, |idx| self.in_degree[idx])
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = (&str, &NodeAttrs)> {
        self.nodes.iter().map(|n| (n.id.as_str(), &n.attrs))
    }

    /// Edges in insertion order
    pub fn edges(&self) -> impl Iterator<Item = EdgeRef<'_>> {
        self.edges.iter().map(|e| EdgeRef {
            src: &self.nodes[e.src].id,
            dst: &self.nodes[e.dst].id,
            kind: e.kind,
            attrs: &e.attrs,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.node_index.clear();
        self.edges.clear();
        self.edge_index.clear();
        self.outgoing.clear();
        self.in_degree.clear();
        self.latest.clear();
    }

    /// Fold another run's graph into this one
    ///
    /// Used by multi-threaded hosts that trace with one context per thread.
    /// Invocation counts and edge weights add up; `last_args` and other edge
    /// attributes take the other graph's values when present.
    pub fn merge(&mut self, other: &ProvenanceGraph) {
        for (id, attrs) in other.nodes() {
            if !self.ensure_node(id, attrs.clone()) {
                if let Some(idx) = self.index_of(id) {
                    self.nodes[idx].attrs.invocation_count += attrs.invocation_count;
                }
            }
        }
        for edge in other.edges() {
            if self.ensure_edge(edge.src, edge.dst, edge.kind) {
                if let Some(idx) = self.edge_slot(edge.src, edge.dst, edge.kind) {
                    let attrs = &mut self.edges[idx].attrs;
                    attrs.weight += edge.attrs.weight;
                    if !edge.attrs.last_args.is_empty() {
                        attrs.last_args = edge.attrs.last_args.clone();
                    }
                }
            } else if let Some(idx) = self.edge_slot(edge.src, edge.dst, edge.kind) {
                self.edges[idx].attrs = edge.attrs.clone();
            }
        }
    }

    /// Serializable document with node and edge records in insertion order
    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            version: GRAPH_FORMAT_VERSION,
            nodes: self
                .nodes()
                .map(|(id, attrs)| NodeRecord {
                    id: id.to_string(),
                    attrs: attrs.clone(),
                })
                .collect(),
            edges: self
                .edges()
                .map(|e| EdgeRecord {
                    src: e.src.to_string(),
                    dst: e.dst.to_string(),
                    kind: e.kind,
                    attrs: e.attrs.clone(),
                })
                .collect(),
        }
    }

    /// Rebuild a graph from its document, validating every edge endpoint
    pub fn from_document(doc: GraphDocument) -> Result<Self, GraphError> {
        if doc.version != GRAPH_FORMAT_VERSION {
            return Err(GraphError::VersionMismatch {
                expected: GRAPH_FORMAT_VERSION,
                found: doc.version,
            });
        }
        let mut graph = ProvenanceGraph::new();
        for node in doc.nodes {
            if !graph.ensure_node(&node.id, node.attrs) {
                return Err(GraphError::DuplicateNode(node.id));
            }
        }
        for edge in doc.edges {
            for endpoint in [&edge.src, &edge.dst] {
                if !graph.contains_node(endpoint) {
                    return Err(GraphError::DanglingEdge {
                        src: edge.src.clone(),
                        dst: edge.dst.clone(),
                        missing: endpoint.clone(),
                    });
                }
            }
            graph.ensure_edge(&edge.src, &edge.dst, edge.kind);
            if let Some(idx) = graph.edge_slot(&edge.src, &edge.dst, edge.kind) {
                graph.edges[idx].attrs = edge.attrs;
            }
        }
        Ok(graph)
    }
}

impl From<ProvenanceGraph> for GraphDocument {
    fn from(graph: ProvenanceGraph) -> Self {
        graph.to_document()
    }
}

impl TryFrom<GraphDocument> for ProvenanceGraph {
    type Error = GraphError;

    fn try_from(doc: GraphDocument) -> Result<Self, Self::Error> {
        ProvenanceGraph::from_document(doc)
    }
}
