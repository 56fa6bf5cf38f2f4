//! Render description, Graphviz DOT output and textual summary
//!
//! [`describe`] turns a graph plus its [`Levels`] into a renderer-agnostic
//! [`RenderSpec`]:
//!
//! ```text
//!   node   circle, width grows with invocation_count
//!          orange when invoked more than once, sky blue otherwise
//!   edge   label "Refs: <weight>" plus the last argument summary
//!          call edges between two orange nodes drawn red, penwidth 2
//! ```
//!
//! [`render`] writes it as DOT (`.dot`/`.gv`) or JSON (`.json`). Rendering is
//! never repeated: an existing artifact is left alone, and an empty graph
//! produces nothing.

use crate::layout::{assign_levels, hierarchical_layout, Levels, Position};
use crate::provenance_graph::{EdgeKind, ProvenanceGraph};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

pub const HIGHLIGHT_FILL: &str = "orange";
pub const DEFAULT_FILL: &str = "skyblue";
pub const EMPHASIS_COLOR: &str = "red";

/// One drawable node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderNode {
    pub id: String,
    pub level: usize,
    pub position: Position,
    pub invocation_count: u64,
    /// Invoked more than once
    pub highlighted: bool,
    pub is_value: bool,
    pub fill: &'static str,
    pub width: f64,
}

/// One drawable edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderEdge {
    pub src: String,
    pub dst: String,
    pub kind: EdgeKind,
    pub label: String,
    /// Call edge between two highlighted nodes
    pub emphasized: bool,
}

/// Renderer-agnostic description of a leveled graph
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderSpec {
    pub nodes: Vec<RenderNode>,
    pub edges: Vec<RenderEdge>,
    pub levels: usize,
}

/// What [`render`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportOutcome {
    Written,
    SkippedExisting,
    SkippedEmpty,
}

fn node_width(invocation_count: u64) -> f64 {
    0.75 + 0.15 * invocation_count.saturating_sub(1).min(10) as f64
}

fn edge_label(weight: u64, last_args: &str) -> String {
    if last_args.is_empty() {
        format!("Refs: {}", weight)
    } else {
        format!("Refs: {}\n{}", weight, last_args)
    }
}

/// Build the render description of `graph` laid out by `levels`
pub fn describe(graph: &ProvenanceGraph, levels: &Levels) -> RenderSpec {
    let positions: HashMap<String, Position> = hierarchical_layout(levels).into_iter().collect();

    let nodes: Vec<RenderNode> = levels
        .iter()
        .filter_map(|(id, level)| {
            let attrs = graph.node(id)?;
            let highlighted = attrs.invocation_count > 1;
            Some(RenderNode {
                id: id.to_string(),
                level,
                position: positions.get(id).copied().unwrap_or(Position { x: 0.0, y: 0.0 }),
                invocation_count: attrs.invocation_count,
                highlighted,
                is_value: attrs.is_value(),
                fill: if highlighted { HIGHLIGHT_FILL } else { DEFAULT_FILL },
                width: node_width(attrs.invocation_count),
            })
        })
        .collect();

    let highlighted = |id: &str| graph.node(id).is_some_and(|a| a.invocation_count > 1);
    let edges = graph
        .edges()
        .map(|e| RenderEdge {
            src: e.src.to_string(),
            dst: e.dst.to_string(),
            kind: e.kind,
            label: edge_label(e.attrs.weight, &e.attrs.last_args),
            emphasized: e.kind == EdgeKind::Call && highlighted(e.src) && highlighted(e.dst),
        })
        .collect();

    RenderSpec {
        nodes,
        edges,
        levels: levels.depth(),
    }
}

fn escape_dot(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Graphviz DOT text for a render description
pub fn to_dot(spec: &RenderSpec) -> String {
    let mut out = String::new();
    out.push_str("digraph provenance {\n");
    out.push_str("    rankdir=TB;\n");
    out.push_str("    node [shape=circle, style=filled, fontsize=10];\n");
    out.push_str("    edge [fontsize=8];\n");

    let mut by_level: Vec<Vec<&RenderNode>> = vec![Vec::new(); spec.levels];
    for node in &spec.nodes {
        let _ = writeln!(
            out,
            "    \"{}\" [fillcolor={}, width={:.2}, pos=\"{},{}!\"];",
            escape_dot(&node.id),
            node.fill,
            node.width,
            node.position.x,
            node.position.y
        );
        if let Some(level) = by_level.get_mut(node.level) {
            level.push(node);
        }
    }

    for level in by_level.iter().filter(|l| !l.is_empty()) {
        let ids: Vec<String> = level
            .iter()
            .map(|n| format!("\"{}\"", escape_dot(&n.id)))
            .collect();
        let _ = writeln!(out, "    {{ rank=same; {}; }}", ids.join("; "));
    }

    for edge in &spec.edges {
        let mut attrs = vec![format!("label=\"{}\"", escape_dot(&edge.label))];
        match edge.kind {
            EdgeKind::Sibling => attrs.push("style=dashed".to_string()),
            EdgeKind::Value => attrs.push("style=dotted, color=gray".to_string()),
            EdgeKind::Call => {}
        }
        if edge.emphasized {
            attrs.push(format!("color={}, penwidth=2", EMPHASIS_COLOR));
        }
        let _ = writeln!(
            out,
            "    \"{}\" -> \"{}\" [{}];",
            escape_dot(&edge.src),
            escape_dot(&edge.dst),
            attrs.join(", ")
        );
    }

    out.push_str("}\n");
    out
}

/// Write a rendered artifact for `graph`, at most once
///
/// `.json` paths receive the [`RenderSpec`] as JSON, other paths DOT text.
pub fn render(graph: &ProvenanceGraph, path: impl AsRef<Path>) -> io::Result<ExportOutcome> {
    let path = path.as_ref();
    if path.exists() {
        tracing::debug!("render {} already exists; skipping", path.display());
        return Ok(ExportOutcome::SkippedExisting);
    }
    if graph.is_empty() {
        tracing::debug!("graph is empty; nothing to render");
        return Ok(ExportOutcome::SkippedEmpty);
    }

    let spec = describe(graph, &assign_levels(graph));
    let content = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::to_string_pretty(&spec).map_err(io::Error::other)?,
        _ => to_dot(&spec),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(ExportOutcome::Written)
}

/// Call counts per call node and reference counts per dependency
pub fn summary(graph: &ProvenanceGraph) -> String {
    let mut out = String::from("Function calls:\n");
    for (id, attrs) in graph.nodes().filter(|(_, a)| !a.is_value()) {
        let _ = writeln!(out, "  {}: {} calls", id, attrs.invocation_count);
    }
    out.push_str("Dependencies:\n");
    for edge in graph.edges().filter(|e| e.kind != EdgeKind::Value) {
        let relation = match edge.kind {
            EdgeKind::Sibling => " (sibling)",
            _ => "",
        };
        let _ = writeln!(
            out,
            "  {} -> {}{}: {} refs",
            edge.src, edge.dst, relation, edge.attrs.weight
        );
    }
    let values = graph.nodes().filter(|(_, a)| a.is_value()).count();
    let _ = writeln!(out, "Values: {}", values);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provenance_graph::{EdgeAttr, NodeAttrs};
    use tempfile::TempDir;

    fn graph() -> ProvenanceGraph {
        let mut g = ProvenanceGraph::new();
        g.ensure_node("eval.f", NodeAttrs::call());
        g.bump_invocation("eval.f");
        g.bump_invocation("eval.f");
        g.ensure_node("eval.g", NodeAttrs::call());
        g.bump_invocation("eval.g");
        g.bump_invocation("eval.g");
        g.ensure_node("eval.h", NodeAttrs::call());
        g.bump_invocation("eval.h");
        g.ensure_edge("eval.f", "eval.g", EdgeKind::Call);
        g.set_edge_attr("eval.f", "eval.g", EdgeKind::Call, EdgeAttr::LastArgs("ndarray(3,)".into()));
        g.ensure_edge("eval.f", "eval.h", EdgeKind::Call);
        g.ensure_edge("eval.g", "eval.h", EdgeKind::Sibling);
        g
    }

    #[test]
    fn test_describe_highlights_repeated_calls() {
        let g = graph();
        let spec = describe(&g, &assign_levels(&g));
        let f = spec.nodes.iter().find(|n| n.id == "eval.f").unwrap();
        let h = spec.nodes.iter().find(|n| n.id == "eval.h").unwrap();
        assert!(f.highlighted);
        assert_eq!(f.fill, HIGHLIGHT_FILL);
        assert!(!h.highlighted);
        assert_eq!(h.fill, DEFAULT_FILL);
        assert!(f.width > h.width);

        let fg = spec.edges.iter().find(|e| e.dst == "eval.g").unwrap();
        assert!(fg.emphasized);
        assert_eq!(fg.label, "Refs: 1\nndarray(3,)");
        let fh = spec.edges.iter().find(|e| e.src == "eval.f" && e.dst == "eval.h").unwrap();
        assert!(!fh.emphasized);
    }

    #[test]
    fn test_dot_output() {
        let g = graph();
        let dot = to_dot(&describe(&g, &assign_levels(&g)));
        assert!(dot.starts_with("digraph provenance {"));
        assert!(dot.contains("\"eval.f\" -> \"eval.g\" [label=\"Refs: 1\\nndarray(3,)\", color=red, penwidth=2];"));
        assert!(dot.contains("\"eval.g\" -> \"eval.h\" [label=\"Refs: 1\", style=dashed];"));
        assert!(dot.contains("{ rank=same; \"eval.g\"; \"eval.h\"; }"));
    }

    #[test]
    fn test_escape_dot() {
        assert_eq!(escape_dot(r#"a"b\c"#), r#"a\"b\\c"#);
    }

    #[test]
    fn test_render_skips_existing_and_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.dot");
        assert_eq!(render(&ProvenanceGraph::new(), &path).unwrap(), ExportOutcome::SkippedEmpty);
        assert!(!path.exists());

        assert_eq!(render(&graph(), &path).unwrap(), ExportOutcome::Written);
        let first = fs::read_to_string(&path).unwrap();

        let mut changed = graph();
        changed.ensure_node("eval.extra", NodeAttrs::call());
        assert_eq!(render(&changed, &path).unwrap(), ExportOutcome::SkippedExisting);
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn test_render_json_spec() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("render.json");
        render(&graph(), &path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["nodes"].as_array().unwrap().len(), 3);
        assert_eq!(value["levels"], 2);
    }

    #[test]
    fn test_summary_text() {
        let text = summary(&graph());
        assert!(text.contains("  eval.f: 2 calls\n"));
        assert!(text.contains("  eval.f -> eval.g: 1 refs\n"));
        assert!(text.contains("  eval.g -> eval.h (sibling): 1 refs\n"));
        assert!(text.ends_with("Values: 0\n"));
    }
}
