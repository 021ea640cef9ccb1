//! The concept catalog.
//!
//! Catalogs are assembled with an [`EnvironmentBuilder`], which tolerates
//! forward references, and frozen into an [`Environment`] once every
//! reference is bound. Planning only ever reads an `Environment`.
//!
//! ```text
//!   add_concept / add_datasource / lookup
//!                 │
//!                 ▼
//!        EnvironmentBuilder ──build()──▶ bind placeholders
//!                                          │
//!                                          ▼
//!                                   derive date parts
//!                                          │
//!                                          ▼
//!                                     Environment
//! ```

mod builder;
mod date_parts;
mod suggestions;

pub use builder::{ConceptLookup, EnvironmentBuilder};
pub use date_parts::derive_date_parts;
pub use suggestions::find_similar;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{PlanError, PlanResult};
use crate::model::{Concept, Datasource, DEFAULT_NAMESPACE};

/// An immutable catalog of concepts and datasources.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    concepts: BTreeMap<String, Concept>,
    /// Declaration order.
    datasources: Vec<Datasource>,
    datasource_index: HashMap<String, usize>,
    materialized: BTreeSet<String>,
}

impl Environment {
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::new()
    }

    pub(crate) fn from_parts(concepts: BTreeMap<String, Concept>, datasources: Vec<Datasource>) -> Self {
        let datasource_index = datasources
            .iter()
            .enumerate()
            .map(|(index, ds)| (ds.identifier.clone(), index))
            .collect();
        let materialized = datasources
            .iter()
            .flat_map(|ds| ds.columns.iter().map(|c| c.concept.address()))
            .filter(|address| concepts.contains_key(address))
            .collect();
        Self {
            concepts,
            datasources,
            datasource_index,
            materialized,
        }
    }

    /// Normalize a possibly unqualified reference to an address.
    pub fn qualify(&self, reference: &str) -> String {
        qualify(reference, |address| self.concepts.contains_key(address))
    }

    /// Strict lookup. Unqualified names resolve in the default namespace.
    pub fn concept(&self, reference: &str) -> PlanResult<&Concept> {
        let address = self.qualify(reference);
        self.concepts
            .get(&address)
            .ok_or_else(|| PlanError::UndefinedConcept {
                suggestions: find_similar(&address, self.concepts.keys()),
                address,
            })
    }

    pub fn get(&self, reference: &str) -> Option<&Concept> {
        self.concepts.get(&self.qualify(reference))
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.get(reference).is_some()
    }

    pub fn concepts(&self) -> impl Iterator<Item = &Concept> {
        self.concepts.values()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &String> {
        self.concepts.keys()
    }

    /// Datasources in declaration order.
    pub fn datasources(&self) -> &[Datasource] {
        &self.datasources
    }

    pub fn datasource(&self, identifier: &str) -> Option<&Datasource> {
        self.datasource_index
            .get(identifier)
            .and_then(|index| self.datasources.get(*index))
    }

    /// Concepts bound by at least one datasource column.
    pub fn materialized_concepts(&self) -> Vec<&Concept> {
        self.materialized
            .iter()
            .filter_map(|address| self.concepts.get(address))
            .collect()
    }

    pub fn is_materialized(&self, address: &str) -> bool {
        self.materialized.contains(address)
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }
}

/// Qualify `reference` with the default namespace unless it is already a
/// known address.
pub(crate) fn qualify(reference: &str, known: impl Fn(&str) -> bool) -> String {
    if known(reference) {
        return reference.to_string();
    }
    let local = format!("{}.{}", DEFAULT_NAMESPACE, reference);
    if known(&local) || !reference.contains('.') {
        return local;
    }
    reference.to_string()
}
