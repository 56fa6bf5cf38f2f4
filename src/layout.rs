//! Leveling and hierarchical layout
//!
//! Levels come from a layered breadth-first traversal that starts at every
//! node with in-degree zero. A node keeps the level at which it is first
//! reached. Membership in the visited set bounds the traversal, so self-loops
//! and re-entrant edges from shared-node recursion cannot make it loop.
//!
//! Nodes that no root reaches (every member of a pure cycle has in-degree at
//! least one) are seeded at level 0 in insertion order once the roots are
//! exhausted, so every node receives a level.

use crate::provenance_graph::ProvenanceGraph;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

/// Level assignment for every node of a graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Levels {
    /// Node ids per level, in discovery order
    layers: Vec<Vec<String>>,
    #[serde(skip)]
    level_of: HashMap<String, usize>,
}

impl Levels {
    pub fn level(&self, id: &str) -> Option<usize> {
        self.level_of.get(id).copied()
    }

    pub fn layers(&self) -> &[Vec<String>] {
        &self.layers
    }

    /// Number of levels
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Number of leveled nodes
    pub fn len(&self) -> usize {
        self.level_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.level_of.is_empty()
    }

    /// `(node, level)` pairs, level by level
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(level, ids)| ids.iter().map(move |id| (id.as_str(), level)))
    }

    fn place(&mut self, id: &str, level: usize) {
        if self.layers.len() <= level {
            self.layers.resize_with(level + 1, Vec::new);
        }
        self.layers[level].push(id.to_string());
        self.level_of.insert(id.to_string(), level);
    }
}

/// Assign every node a level by layered breadth-first traversal
///
/// Roots (in-degree zero) sit at level 0 and every successor, of any edge
/// kind, one level below the node that first reached it.
///
/// # Arguments
///
/// * `graph` - The provenance graph; it is not modified
///
/// # Returns
///
/// [`Levels`] covering every node exactly once. Cycles unreachable from any
/// root are seeded at level 0 in node insertion order.
///
/// # Example
///
/// ```
/// use rastro::layout::assign_levels;
/// use rastro::provenance_graph::{EdgeKind, ProvenanceGraph};
///
/// let mut graph = ProvenanceGraph::new();
/// graph.ensure_edge("eval.f", "eval.g", EdgeKind::Call);
/// graph.ensure_edge("eval.g", "eval.g", EdgeKind::Call);
/// graph.ensure_edge("eval.g", "eval.h", EdgeKind::Sibling);
///
/// let levels = assign_levels(&graph);
/// assert_eq!(levels.level("eval.f"), Some(0));
/// assert_eq!(levels.level("eval.g"), Some(1));
/// assert_eq!(levels.level("eval.h"), Some(2));
/// assert_eq!(levels.len(), 3);
/// ```
pub fn assign_levels(graph: &ProvenanceGraph) -> Levels {
    let mut levels = Levels::default();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<(&str, usize)> = VecDeque::new();

    for (id, _) in graph.nodes() {
        if graph.in_degree(id) == 0 {
            visited.insert(id);
            queue.push_back((id, 0));
        }
    }
    traverse(graph, &mut levels, &mut visited, &mut queue);

    if visited.len() < graph.node_count() {
        let unreached: Vec<&str> = graph
            .nodes()
            .map(|(id, _)| id)
            .filter(|id| !visited.contains(id))
            .collect();
        tracing::debug!("{} nodes unreachable from roots; seeding cycles", unreached.len());
        for id in unreached {
            if visited.insert(id) {
                queue.push_back((id, 0));
                traverse(graph, &mut levels, &mut visited, &mut queue);
            }
        }
    }

    levels
}

fn traverse<'g>(
    graph: &'g ProvenanceGraph,
    levels: &mut Levels,
    visited: &mut HashSet<&'g str>,
    queue: &mut VecDeque<(&'g str, usize)>,
) {
    while let Some((id, level)) = queue.pop_front() {
        levels.place(id, level);
        for next in graph.successors(id) {
            if visited.insert(next) {
                queue.push_back((next, level + 1));
            }
        }
    }
}

/// Plot coordinates of a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Centre each level horizontally and stack levels downwards
///
/// The `i`-th of `n` nodes on level `l` sits at `(i - n/2, -l)`.
pub fn hierarchical_layout(levels: &Levels) -> Vec<(String, Position)> {
    let mut positions = Vec::with_capacity(levels.len());
    for (level, ids) in levels.layers().iter().enumerate() {
        let half = ids.len() as f64 / 2.0;
        for (i, id) in ids.iter().enumerate() {
            positions.push((
                id.clone(),
                Position {
                    x: i as f64 - half,
                    y: -(level as f64),
                },
            ));
        }
    }
    positions
}
