//! Mutable catalog assembly with deferred reference binding.

use std::collections::BTreeMap;

use super::date_parts::derive_date_parts;
use super::suggestions::find_similar;
use super::{qualify, Environment};
use crate::config::EnvironmentSettings;
use crate::error::{PlanError, PlanResult};
use crate::model::{Concept, ConceptSource, Datasource};

/// Result of a lenient lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum ConceptLookup {
    Defined(Concept),
    /// A placeholder, bound when the catalog is built.
    Undefined(Concept),
}

impl ConceptLookup {
    pub fn into_concept(self) -> Concept {
        match self {
            ConceptLookup::Defined(concept) | ConceptLookup::Undefined(concept) => concept,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, ConceptLookup::Defined(_))
    }
}

/// Collects declarations for an [`Environment`].
#[derive(Debug, Clone)]
pub struct EnvironmentBuilder {
    concepts: BTreeMap<String, Concept>,
    datasources: Vec<Datasource>,
    undefined: BTreeMap<String, Concept>,
    fail_on_missing: bool,
    auto_derive_date_parts: bool,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentBuilder {
    pub fn new() -> Self {
        Self {
            concepts: BTreeMap::new(),
            datasources: Vec::new(),
            undefined: BTreeMap::new(),
            fail_on_missing: false,
            auto_derive_date_parts: true,
        }
    }

    pub fn with_settings(mut self, settings: &EnvironmentSettings) -> Self {
        self.auto_derive_date_parts = settings.auto_derive_date_parts;
        self
    }

    /// Make [`lookup`](Self::lookup) fail on unknown references instead of
    /// returning a placeholder.
    pub fn with_fail_on_missing(mut self, fail_on_missing: bool) -> Self {
        self.fail_on_missing = fail_on_missing;
        self
    }

    /// Register a concept under its address.
    ///
    /// Re-declaring an address is an error unless the existing entry was
    /// auto-derived or `allow_duplicate` is set.
    pub fn add_concept(&mut self, concept: Concept, allow_duplicate: bool) -> PlanResult<()> {
        let address = concept.address();
        if let Some(existing) = self.concepts.get(&address) {
            if !allow_duplicate && existing.metadata.concept_source != ConceptSource::AutoDerived {
                return Err(PlanError::DuplicateConcept { address });
            }
        }
        tracing::debug!(concept = %address, "Registering concept");
        self.undefined.remove(&address);
        self.concepts.insert(address, concept);
        Ok(())
    }

    /// Register a datasource, replacing any previous one with the same
    /// identifier. Column concepts not yet declared are registered too.
    pub fn add_datasource(&mut self, datasource: Datasource) -> PlanResult<()> {
        for column in &datasource.columns {
            let address = column.concept.address();
            if !self.concepts.contains_key(&address) && !column.concept.is_placeholder() {
                self.add_concept(column.concept.clone(), false)?;
            }
        }
        match self
            .datasources
            .iter()
            .position(|existing| existing.identifier == datasource.identifier)
        {
            Some(index) => self.datasources[index] = datasource,
            None => self.datasources.push(datasource),
        }
        Ok(())
    }

    /// Look up a reference, synthesizing a placeholder on a miss.
    ///
    /// With `fail_on_missing`, a miss is an `UndefinedConcept` error carrying
    /// suggestions instead.
    pub fn lookup(&mut self, reference: &str) -> PlanResult<ConceptLookup> {
        let address = qualify(reference, |address| self.concepts.contains_key(address));
        if let Some(concept) = self.concepts.get(&address) {
            return Ok(ConceptLookup::Defined(concept.clone()));
        }
        if self.fail_on_missing {
            return Err(PlanError::UndefinedConcept {
                suggestions: find_similar(&address, self.concepts.keys()),
                address,
            });
        }
        let placeholder = self
            .undefined
            .entry(address.clone())
            .or_insert_with(|| {
                let (namespace, name) = address
                    .split_once('.')
                    .unwrap_or((crate::model::DEFAULT_NAMESPACE, address.as_str()));
                Concept::placeholder(namespace, name)
            })
            .clone();
        Ok(ConceptLookup::Undefined(placeholder))
    }

    /// References that are still undefined.
    pub fn undefined(&self) -> impl Iterator<Item = &String> {
        self.undefined.keys()
    }

    /// Bind every placeholder, derive date parts and freeze the catalog.
    pub fn build(self) -> PlanResult<Environment> {
        let mut concepts = bind_concepts(self.concepts)?;

        if self.auto_derive_date_parts {
            let temporal: Vec<Concept> = concepts
                .values()
                .filter(|c| c.datatype.is_temporal())
                .filter(|c| c.metadata.concept_source != ConceptSource::AutoDerived)
                .cloned()
                .collect();
            for concept in temporal {
                for derived in derive_date_parts(&concept)? {
                    concepts.entry(derived.address()).or_insert(derived);
                }
            }
        }

        let resolver = |reference: &str| resolve_in(&concepts, reference);
        let datasources = self
            .datasources
            .into_iter()
            .map(|mut datasource| {
                for column in &mut datasource.columns {
                    if column.concept.has_placeholders() {
                        column.concept = column.concept.rebind(&resolver)?;
                    }
                }
                Ok(datasource)
            })
            .collect::<PlanResult<Vec<_>>>()?;

        let environment = Environment::from_parts(concepts, datasources);
        tracing::info!(
            concepts = environment.len(),
            datasources = environment.datasources().len(),
            "Built environment"
        );
        Ok(environment)
    }
}

fn resolve_in(concepts: &BTreeMap<String, Concept>, reference: &str) -> PlanResult<Concept> {
    let address = qualify(reference, |address| concepts.contains_key(address));
    concepts
        .get(&address)
        .cloned()
        .ok_or_else(|| PlanError::UndefinedConcept {
            suggestions: find_similar(&address, concepts.keys()),
            address,
        })
}

/// Replace placeholders with their declarations, one lineage level per pass.
fn bind_concepts(mut concepts: BTreeMap<String, Concept>) -> PlanResult<BTreeMap<String, Concept>> {
    let max_passes = concepts.len() + 1;
    for _ in 0..max_passes {
        let pending: Vec<String> = concepts
            .iter()
            .filter(|(_, concept)| concept.has_placeholders())
            .map(|(address, _)| address.clone())
            .collect();
        if pending.is_empty() {
            return Ok(concepts);
        }
        let snapshot = concepts.clone();
        let resolver = |reference: &str| resolve_in(&snapshot, reference);
        for address in pending {
            if let Some(concept) = concepts.get(&address) {
                let bound = concept.rebind(&resolver)?;
                concepts.insert(address, bound);
            }
        }
    }

    let unresolved: Vec<String> = concepts
        .iter()
        .filter(|(_, concept)| concept.has_placeholders())
        .map(|(address, _)| address.clone())
        .collect();
    if unresolved.is_empty() {
        Ok(concepts)
    } else {
        Err(PlanError::Unresolvable {
            concepts: unresolved,
        })
    }
}
