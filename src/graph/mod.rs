// Derived graphs over an index snapshot

pub mod api_flow;
pub mod matrix;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};

use crate::index::artifacts::{self, API_FLOW_FILE, DEPENDENCY_GRAPH_FILE, MATRIX_FILE};
use crate::index::{CallEdge, ComponentRecord};

pub use api_flow::ApiFlowGraph;
pub use matrix::{MatrixRow, RelationshipMatrix};

/// Snapshot of the store: path -> record
pub type Snapshot = BTreeMap<String, ComponentRecord>;

/// Class name -> simple names of its retained imports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn build(snapshot: &Snapshot) -> Self {
        let mut edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for record in snapshot.values() {
            for class in record.class_names() {
                let targets = edges.entry(class.to_string()).or_default();
                targets.extend(record.dependency_names().map(str::to_string));
            }
        }
        Self { edges }
    }

    pub fn dependencies_of(&self, class: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(class)
            .into_iter()
            .flat_map(|targets| targets.iter().map(String::as_str))
    }

    pub fn dependents_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |(_, targets)| targets.contains(name))
            .map(|(class, _)| class.as_str())
    }

    pub fn node_count(&self) -> usize {
        let mut nodes: BTreeSet<&str> = self.edges.keys().map(String::as_str).collect();
        nodes.extend(self.edges.values().flatten().map(String::as_str));
        nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// DOT text for external rendering
    pub fn to_dot(&self) -> String {
        let quote = |name: &str| format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""));

        let mut dot = String::from("digraph dependencies {\n    rankdir=LR;\n    node [shape=box];\n");
        for (class, targets) in &self.edges {
            if targets.is_empty() {
                dot.push_str(&format!("    {};\n", quote(class)));
            }
            for target in targets {
                dot.push_str(&format!("    {} -> {};\n", quote(class), quote(target)));
            }
        }
        dot.push_str("}\n");
        dot
    }
}

/// File-level call graph built from resolved call edges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallGraph {
    edges: BTreeSet<CallEdge>,
    files: BTreeMap<String, BTreeSet<String>>,
}

impl CallGraph {
    pub fn build(snapshot: &Snapshot) -> Self {
        let mut graph = Self::default();
        for (path, record) in snapshot {
            for edge in &record.call_graph {
                let mut edge = edge.clone();
                edge.caller = path.clone();
                graph
                    .files
                    .entry(path.clone())
                    .or_default()
                    .insert(edge.callee_file.clone());
                graph.edges.insert(edge);
            }
        }
        graph
    }

    pub fn callees_of(&self, file: &str) -> impl Iterator<Item = &str> {
        self.files
            .get(file)
            .into_iter()
            .flat_map(|targets| targets.iter().map(String::as_str))
    }

    pub fn callers_of<'a>(&'a self, file: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.files
            .iter()
            .filter(move |(_, targets)| targets.contains(file))
            .map(|(caller, _)| caller.as_str())
    }

    /// Every resolved call of a method or class name
    pub fn references(&self, callee: &str) -> Vec<&CallEdge> {
        self.edges.iter().filter(|edge| edge.callee == callee).collect()
    }

    pub fn edge_count(&self) -> usize {
        self.files.values().map(BTreeSet::len).sum()
    }
}

/// Every derived view of one snapshot
#[derive(Debug, Clone, Default)]
pub struct GraphSet {
    pub dependencies: DependencyGraph,
    pub calls: CallGraph,
    pub api_flows: ApiFlowGraph,
    pub matrix: RelationshipMatrix,
}

impl GraphSet {
    pub fn build(snapshot: &Snapshot) -> Self {
        let graphs = Self {
            dependencies: DependencyGraph::build(snapshot),
            calls: CallGraph::build(snapshot),
            api_flows: ApiFlowGraph::build(snapshot),
            matrix: RelationshipMatrix::build(snapshot),
        };
        debug!(
            "Built graphs: {} dependency edges, {} call edges, {} endpoint paths, {} matrix rows",
            graphs.dependencies.edge_count(),
            graphs.calls.edge_count(),
            graphs.api_flows.len(),
            graphs.matrix.len()
        );
        graphs
    }

    /// Write the API-flow, matrix and DOT artifacts into `dir`
    pub fn write_artifacts(&self, dir: &Path) -> anyhow::Result<()> {
        artifacts::save_json(&dir.join(API_FLOW_FILE), &self.api_flows)?;
        artifacts::write_text_logged(&dir.join(MATRIX_FILE), &self.matrix.to_markdown());
        artifacts::write_text_logged(&dir.join(DEPENDENCY_GRAPH_FILE), &self.dependencies.to_dot());
        info!("Wrote graph artifacts to {}", dir.display());
        Ok(())
    }
}
