//! Reference graph linking concepts to the datasources that provide them.
//!
//! ```text
//!   ds~revenue ──Provides──▶ c~local.amount ◀──DerivesFrom── c~local.total_revenue
//!       ▲                        │
//!       └─────────BoundTo────────┘
//! ```
//!
//! Datasource and concept nodes are linked in both directions, so a path
//! between two datasources alternates datasource and concept nodes. A path
//! from a datasource to a concept with a single datasource node on it means
//! the concept is available from that table without a join.

mod builder;
pub mod query;
pub mod types;

pub use types::{
    concept_address, concept_node, datasource_node, is_datasource_node, GraphEdge, GraphNode,
};

use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by graph queries.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Node not found in reference graph: {0}")]
    NodeNotFound(String),
}

/// Result type for graph queries.
pub type GraphResult<T> = Result<T, GraphError>;

/// Directed graph of concept and datasource nodes.
#[derive(Debug, Clone, Default)]
pub struct ReferenceGraph {
    graph: DiGraph<GraphNode, GraphEdge>,

    /// Node name → NodeIndex
    node_index: HashMap<String, NodeIndex>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or insert a node.
    pub fn add_node(&mut self, node: GraphNode) -> NodeIndex {
        let name = node.name();
        if let Some(index) = self.node_index.get(&name) {
            return *index;
        }
        let index = self.graph.add_node(node);
        self.node_index.insert(name, index);
        index
    }

    /// Add an edge unless an identical one already exists.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: GraphEdge) {
        let exists = self
            .graph
            .edges_connecting(from, to)
            .any(|existing| *existing.weight() == edge);
        if !exists {
            self.graph.add_edge(from, to, edge);
        }
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.node_index.contains_key(name)
    }

    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        self.node_index
            .get(name)
            .and_then(|index| self.graph.node_weight(*index))
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub(crate) fn index_of(&self, name: &str) -> GraphResult<NodeIndex> {
        self.node_index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::NodeNotFound(name.to_string()))
    }
}
