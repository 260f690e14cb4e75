//! Compatibility tracking between versions of one subject
//!
//! Adjacent versions are seeded compatible in both directions when the later
//! one registers. Any other ordered pair is compatible only if a chain between
//! them resolves; that answer is computed on first query and cached.

use std::collections::HashMap;
use std::sync::RwLock;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::resolver::ChainResolver;
use crate::version::VersionHistory;

/// Cached compatibility answers keyed by `(from, to)` sequence numbers
#[derive(Debug, Default)]
pub struct CompatibilityMatrix {
    edges: RwLock<HashMap<(u64, u64), bool>>,
}

/// One ordered pair in a compatibility report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompatibilityEdge {
    pub from: String,
    pub to: String,
    pub compatible: bool,
}

impl CompatibilityMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark two consecutive versions compatible in both directions
    pub fn seed_adjacent(&self, previous: u64, next: u64) -> Result<()> {
        let mut edges = self.edges.write().map_err(lock_error)?;
        edges.insert((previous, next), true);
        edges.insert((next, previous), true);
        Ok(())
    }

    /// Previously computed answer for an ordered pair
    pub fn cached(&self, from: u64, to: u64) -> Result<Option<bool>> {
        Ok(self.edges.read().map_err(lock_error)?.get(&(from, to)).copied())
    }

    /// Number of cached ordered pairs
    pub fn len(&self) -> usize {
        self.edges.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a record can be carried from `from` to `to`.
    ///
    /// Unknown labels are never compatible; a version is always compatible
    /// with itself.
    pub fn check(&self, history: &VersionHistory, from: &str, to: &str) -> Result<bool> {
        let (Some(source), Some(target)) = (history.get(from), history.get(to)) else {
            return Ok(false);
        };
        let key = (source.version.sequence, target.version.sequence);
        if key.0 == key.1 {
            return Ok(true);
        }
        if let Some(known) = self.cached(key.0, key.1)? {
            return Ok(known);
        }

        let compatible = ChainResolver::new(history).resolve(from, to).is_ok();
        debug!(
            subject = history.subject(),
            from, to, compatible, "computed compatibility"
        );
        self.edges.write().map_err(lock_error)?.insert(key, compatible);
        Ok(compatible)
    }

    /// Every ordered pair of distinct versions, in sequence order
    pub fn full(&self, history: &VersionHistory) -> Result<Vec<CompatibilityEdge>> {
        let labels = history.labels();
        let mut report = Vec::with_capacity(labels.len() * labels.len().saturating_sub(1));
        for from in &labels {
            for to in &labels {
                if from == to {
                    continue;
                }
                report.push(CompatibilityEdge {
                    from: from.clone(),
                    to: to.clone(),
                    compatible: self.check(history, from, to)?,
                });
            }
        }
        Ok(report)
    }
}

fn lock_error<T>(err: std::sync::PoisonError<T>) -> SchemaError {
    SchemaError::LockPoisoned(err.to_string())
}

/// Directed graph of compatible version pairs
#[derive(Debug, Clone)]
pub struct CompatibilityGraph {
    subject: String,
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl CompatibilityGraph {
    /// Build from version labels (in sequence order) and a compatibility report
    pub fn from_edges(subject: &str, labels: &[String], edges: &[CompatibilityEdge]) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for label in labels {
            index.insert(label.clone(), graph.add_node(label.clone()));
        }
        for edge in edges.iter().filter(|e| e.compatible) {
            if let (Some(&a), Some(&b)) = (index.get(&edge.from), index.get(&edge.to)) {
                graph.add_edge(a, b, ());
            }
        }
        Self {
            subject: subject.to_string(),
            graph,
            index,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(&a), Some(&b)) => self.graph.contains_edge(a, b),
            _ => false,
        }
    }

    /// Export to GraphViz DOT format
    pub fn to_dot(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("digraph \"{}\" {{\n", escape(&self.subject)));
        output.push_str("  rankdir=LR;\n");
        output.push_str(
            "  node [shape=box, style=\"filled,rounded\", fontname=\"Helvetica\", \
             fontsize=10, fillcolor=\"#E3F2FD\"];\n",
        );
        output.push_str("  edge [fontname=\"Helvetica\", fontsize=8];\n");
        output.push('\n');

        for node in self.graph.node_indices() {
            let label = escape(&self.graph[node]);
            output.push_str(&format!("  \"{}\" [label=\"{}\"];\n", label, label));
        }

        output.push('\n');

        for edge in self.graph.edge_references() {
            let from = &self.graph[edge.source()];
            let to = &self.graph[edge.target()];
            // Forward edges solid, backward edges dashed
            let style = if self.index[from] < self.index[to] {
                "solid"
            } else {
                "dashed"
            };
            output.push_str(&format!(
                "  \"{}\" -> \"{}\" [style={}];\n",
                escape(from),
                escape(to),
                style
            ));
        }

        output.push_str("}\n");
        output
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
