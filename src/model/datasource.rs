//! Physical datasource bindings.

use serde::Serialize;

use super::concept::{Concept, DEFAULT_NAMESPACE};
use super::grain::Grain;
use super::types::{Modifier, Purpose};

/// Physical location of a datasource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Address {
    Table(String),
    /// Raw SQL text used as a subquery.
    Query(String),
}

impl Address {
    pub fn location(&self) -> &str {
        match self {
            Address::Table(name) | Address::Query(name) => name,
        }
    }

    pub fn is_query(&self) -> bool {
        matches!(self, Address::Query(_))
    }
}

/// Binding of one physical column to a concept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnAssignment {
    pub alias: String,
    pub concept: Concept,
    pub modifiers: Vec<Modifier>,
}

impl ColumnAssignment {
    pub fn new(alias: impl Into<String>, concept: Concept) -> Self {
        Self {
            alias: alias.into(),
            concept,
            modifiers: Vec::new(),
        }
    }

    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        if !self.modifiers.contains(&modifier) {
            self.modifiers.push(modifier);
        }
        self
    }

    pub fn is_partial(&self) -> bool {
        self.modifiers.contains(&Modifier::Partial)
    }

    pub fn is_complete(&self) -> bool {
        !self.is_partial()
    }
}

/// A named table or subquery whose columns bind concepts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Datasource {
    pub identifier: String,
    pub columns: Vec<ColumnAssignment>,
    pub address: Address,
    pub grain: Grain,
    pub namespace: String,
}

impl Datasource {
    /// Create a table-backed datasource. The grain defaults to its key columns.
    pub fn new(identifier: impl Into<String>, address: Address, columns: Vec<ColumnAssignment>) -> Self {
        let grain = Grain::new(
            columns
                .iter()
                .filter(|c| c.concept.purpose == Purpose::Key)
                .map(|c| c.concept.clone()),
        );
        Self {
            identifier: identifier.into(),
            columns,
            address,
            grain,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    pub fn table(identifier: impl Into<String>, columns: Vec<ColumnAssignment>) -> Self {
        let identifier = identifier.into();
        let address = Address::Table(identifier.clone());
        Self::new(identifier, address, columns)
    }

    pub fn with_grain(mut self, grain: Grain) -> Self {
        self.grain = grain;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// `namespace_identifier`, or the bare identifier in the default namespace.
    pub fn full_name(&self) -> String {
        if self.namespace == DEFAULT_NAMESPACE || self.namespace.is_empty() {
            self.identifier.clone()
        } else {
            format!("{}_{}", self.namespace, self.identifier)
        }
    }

    pub fn safe_location(&self) -> String {
        match &self.address {
            Address::Table(name) => name.clone(),
            Address::Query(sql) => format!("({})", sql),
        }
    }

    pub fn concepts(&self) -> Vec<Concept> {
        self.columns.iter().map(|c| c.concept.clone()).collect()
    }

    /// Concepts bound by a column carrying the PARTIAL modifier.
    pub fn partial_concepts(&self) -> Vec<Concept> {
        self.columns
            .iter()
            .filter(|c| c.is_partial())
            .map(|c| c.concept.clone())
            .collect()
    }

    pub fn column(&self, address: &str) -> Option<&ColumnAssignment> {
        self.columns.iter().find(|c| c.concept.address() == address)
    }

    pub fn provides(&self, address: &str) -> bool {
        self.column(address).is_some()
    }

    pub fn is_partial_for(&self, address: &str) -> bool {
        self.column(address).is_some_and(|c| c.is_partial())
    }
}
