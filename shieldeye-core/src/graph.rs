use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;

/// How one URL came to point at another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Same-domain anchor
    Navigation,
    /// HTTP redirect within the domain
    Redirect,
    /// Link or redirect leaving the scanned domain
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
}

/// Directed graph of discovered URLs. Every edge endpoint is a node.
#[derive(Debug, Clone, Default)]
pub struct SiteGraph {
    graph: DiGraph<String, EdgeKind>,
    index: HashMap<String, NodeIndex>,
}

impl SiteGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node for `url` if it is not already present
    pub fn add_node(&mut self, url: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(url) {
            return idx;
        }
        let idx = self.graph.add_node(url.to_string());
        self.index.insert(url.to_string(), idx);
        idx
    }

    /// Insert `source -> target`, creating either endpoint on demand.
    /// A repeated edge keeps a single entry with the latest kind.
    pub fn add_edge(&mut self, source: &str, target: &str, kind: EdgeKind) {
        let a = self.add_node(source);
        let b = self.add_node(target);
        self.graph.update_edge(a, b, kind);
    }

    pub fn contains(&self, url: &str) -> bool {
        self.index.contains_key(url)
    }

    pub fn has_edge(&self, source: &str, target: &str) -> bool {
        match (self.index.get(source), self.index.get(target)) {
            (Some(&a), Some(&b)) => self.graph.find_edge(a, b).is_some(),
            _ => false,
        }
    }

    pub fn edge_kind(&self, source: &str, target: &str) -> Option<EdgeKind> {
        let a = *self.index.get(source)?;
        let b = *self.index.get(target)?;
        let edge = self.graph.find_edge(a, b)?;
        self.graph.edge_weight(edge).copied()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Node URLs in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.graph.node_indices().map(|i| self.graph[i].as_str())
    }

    pub fn edges(&self) -> Vec<GraphEdge> {
        self.graph
            .edge_references()
            .map(|e| GraphEdge {
                source: self.graph[e.source()].clone(),
                target: self.graph[e.target()].clone(),
                kind: *e.weight(),
            })
            .collect()
    }

    /// URLs directly linked from `url`
    pub fn successors(&self, url: &str) -> Vec<&str> {
        let Some(&idx) = self.index.get(url) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .graph
            .neighbors(idx)
            .map(|n| self.graph[n].as_str())
            .collect();
        out.sort_unstable();
        out
    }
}

impl Serialize for SiteGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let nodes: Vec<&str> = self.nodes().collect();
        let mut state = serializer.serialize_struct("SiteGraph", 2)?;
        state.serialize_field("nodes", &nodes)?;
        state.serialize_field("edges", &self.edges())?;
        state.end()
    }
}
