//! Node and edge types for the reference graph.

use std::fmt;

/// Prefix of concept node names.
pub const CONCEPT_PREFIX: &str = "c~";

/// Prefix of datasource node names.
pub const DATASOURCE_PREFIX: &str = "ds~";

/// A node in the reference graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GraphNode {
    /// A concept, by address.
    Concept(String),
    /// A declared datasource, by identifier.
    Datasource(String),
}

impl GraphNode {
    /// Stable node name (`c~<address>` or `ds~<identifier>`).
    pub fn name(&self) -> String {
        match self {
            GraphNode::Concept(address) => concept_node(address),
            GraphNode::Datasource(identifier) => datasource_node(identifier),
        }
    }

    pub fn is_datasource(&self) -> bool {
        matches!(self, GraphNode::Datasource(_))
    }

    pub fn concept_address(&self) -> Option<&str> {
        match self {
            GraphNode::Concept(address) => Some(address),
            GraphNode::Datasource(_) => None,
        }
    }
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Edge kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphEdge {
    /// datasource → concept: the datasource outputs the concept
    Provides,
    /// concept → datasource: reverse of `Provides`
    BoundTo,
    /// derived concept → one of its lineage sources
    DerivesFrom,
}

pub fn concept_node(address: &str) -> String {
    format!("{}{}", CONCEPT_PREFIX, address)
}

pub fn datasource_node(identifier: &str) -> String {
    format!("{}{}", DATASOURCE_PREFIX, identifier)
}

pub fn is_datasource_node(name: &str) -> bool {
    name.starts_with(DATASOURCE_PREFIX)
}

/// Strip the `c~` prefix, if present.
pub fn concept_address(name: &str) -> Option<&str> {
    name.strip_prefix(CONCEPT_PREFIX)
}
