//! Recursive concept search.
//!
//! The planner works through the requested concepts one at a time, most
//! derived first. Each concept is handed to the generator for its
//! derivation together with the rest of the request as optional extras; the
//! nodes the generators return are stacked until the stack covers the whole
//! request, then merged.
//!
//! ```text
//! search([a, b, c])
//!   ├── priority: c (aggregate) ──► gen_group_node(c, [a, b]) ──► search(args)
//!   ├── stack: [Group<c, a>]
//!   ├── priority: b (root)      ──► gen_select_node(b, [a, c])
//!   ├── stack: [Group<c, a>, Select<b, a>]  covers [a, b, c]
//!   └── Merge<a, b, c>
//! ```

use std::collections::BTreeSet;

use super::history::History;
use super::join_builder::{get_node_joins, is_connected};
use super::nodes::StrategyNode;
use crate::config::PlannerSettings;
use crate::environment::Environment;
use crate::error::{PlanError, PlanResult};
use crate::graph::ReferenceGraph;
use crate::model::{unique_concepts, Concept, Condition, Derivation};

const LOGGER_PREFIX: &str = "[SEARCH]";

/// Indentation for log lines at a given recursion depth.
pub(crate) fn padding(depth: usize) -> String {
    "\t".repeat(depth)
}

/// How a single concept gets sourced. Declaration order is search priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Strategy {
    MultiSelect,
    Filter,
    Aggregate,
    Window,
    Basic,
    Root,
    Constant,
}

/// A statement row condition applied to the inputs of some aggregates.
///
/// The condition may only reference row-level concepts.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFilter {
    pub condition: Condition,
    /// Addresses of the aggregates whose inputs are filtered.
    pub aggregates: BTreeSet<String>,
}

impl RowFilter {
    pub fn new(condition: Condition, aggregates: impl IntoIterator<Item = String>) -> Self {
        Self {
            condition,
            aggregates: aggregates.into_iter().collect(),
        }
    }

    pub fn applies_to(&self, concept: &Concept) -> bool {
        self.aggregates.contains(&concept.address())
    }
}

/// Searches one environment for plans of concept requests.
///
/// The history is scoped to the planner: build a new planner per query.
pub struct ConceptPlanner<'a> {
    pub(super) environment: &'a Environment,
    pub(super) graph: &'a ReferenceGraph,
    pub(super) accept_partial: bool,
    pub(super) accept_partial_optional: bool,
    pub(super) row_filter: Option<RowFilter>,
    history: History,
}

impl<'a> ConceptPlanner<'a> {
    pub fn new(environment: &'a Environment, graph: &'a ReferenceGraph) -> Self {
        Self {
            environment,
            graph,
            accept_partial: false,
            accept_partial_optional: true,
            row_filter: None,
            history: History::new(),
        }
    }

    pub fn with_settings(mut self, settings: &PlannerSettings) -> Self {
        self.accept_partial = settings.accept_partial;
        self.accept_partial_optional = settings.accept_partial_optional;
        self
    }

    pub fn with_row_filter(mut self, row_filter: Option<RowFilter>) -> Self {
        self.row_filter = row_filter;
        self
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Find a node providing every concept in `mandatory`.
    ///
    /// # Errors
    /// [`PlanError::NoDatasource`] when no plan exists, or any error raised
    /// while building one (ambiguous joins, invalid merges).
    pub fn search_concepts(&mut self, mandatory: &[Concept], depth: usize) -> PlanResult<StrategyNode> {
        let accept_partial = self.accept_partial;
        match self.search(mandatory, depth, accept_partial)? {
            Some(node) => Ok(node),
            None => Err(PlanError::NoDatasource {
                concepts: mandatory.iter().map(|c| c.address()).collect(),
            }),
        }
    }

    /// Memoized search. `Ok(None)` means no plan, which callers may recover from.
    pub(crate) fn search(
        &mut self,
        mandatory: &[Concept],
        depth: usize,
        accept_partial: bool,
    ) -> PlanResult<Option<StrategyNode>> {
        let mandatory = unique_concepts(mandatory.iter().cloned());
        let key = History::search_key(&mandatory, accept_partial);
        if let Some(found) = self.history.get(&key) {
            tracing::debug!("{}{} Found {} in history", padding(depth), LOGGER_PREFIX, key);
            return Ok(found.clone());
        }
        if !self.history.start(&key) {
            tracing::debug!("{}{} {} already in flight", padding(depth), LOGGER_PREFIX, key);
            self.history.short_circuit();
            return Ok(None);
        }
        let result = self.search_uncached(&mandatory, depth, accept_partial);
        let complete = self.history.finish(&key);
        let result = result?;
        // a miss caused by an open cycle may succeed from another entry point
        if result.is_some() || complete {
            self.history.record(key, result.clone());
        }
        Ok(result)
    }

    fn search_uncached(
        &mut self,
        mandatory: &[Concept],
        depth: usize,
        accept_partial: bool,
    ) -> PlanResult<Option<StrategyNode>> {
        tracing::debug!(
            "{}{} Searching for {} (accept_partial={})",
            padding(depth),
            LOGGER_PREFIX,
            display_addresses(mandatory),
            accept_partial
        );

        let mut stack: Vec<StrategyNode> = Vec::new();
        let mut attempted: BTreeSet<String> = BTreeSet::new();
        let mut complete = false;

        while let Some(priority) = self.priority_concept(mandatory, &attempted) {
            let address = priority.address();
            let others: Vec<Concept> = mandatory
                .iter()
                .filter(|c| c.address() != address)
                .cloned()
                .collect();
            let candidate_lists = if others.is_empty() {
                vec![Vec::new()]
            } else {
                vec![others, Vec::new()]
            };

            for local_optional in candidate_lists {
                tracing::debug!(
                    "{}{} Generating {} with optional [{}]",
                    padding(depth),
                    LOGGER_PREFIX,
                    address,
                    display_addresses(&local_optional)
                );
                if let Some(node) = self.generate_node(&priority, &local_optional, depth, accept_partial)? {
                    stack.push(node);
                    break;
                }
            }
            attempted.insert(address);

            if self.validate_stack(&stack, mandatory, accept_partial)? {
                complete = true;
                break;
            }
        }

        if complete {
            tracing::debug!(
                "{}{} Found plan for {} with {} node(s)",
                padding(depth),
                LOGGER_PREFIX,
                display_addresses(mandatory),
                stack.len()
            );
            if stack.len() == 1 {
                return Ok(stack.pop());
            }
            let inputs: Vec<Concept> = stack
                .iter()
                .flat_map(|node| node.output_concepts.iter().cloned())
                .collect();
            return Ok(Some(StrategyNode::merge(
                inputs,
                mandatory.to_vec(),
                stack,
                Vec::new(),
                depth,
            )));
        }

        if let Some(node) = self.gen_merge_node(mandatory, depth, accept_partial)? {
            return Ok(Some(node.with_output_concepts(mandatory.to_vec())));
        }

        if !accept_partial {
            tracing::debug!(
                "{}{} No full plan for {}, retrying with partial sources",
                padding(depth),
                LOGGER_PREFIX,
                display_addresses(mandatory)
            );
            return self.search(mandatory, depth, true);
        }

        tracing::info!(
            "{}{} Could not resolve {}",
            padding(depth),
            LOGGER_PREFIX,
            display_addresses(mandatory)
        );
        Ok(None)
    }

    fn strategy(&self, concept: &Concept) -> Strategy {
        if self.environment.is_materialized(&concept.address()) {
            return Strategy::Root;
        }
        match concept.derivation() {
            Derivation::MultiSelect => Strategy::MultiSelect,
            Derivation::Filter => Strategy::Filter,
            Derivation::Aggregate => Strategy::Aggregate,
            Derivation::Window => Strategy::Window,
            Derivation::Constant => Strategy::Constant,
            Derivation::Basic if concept.is_root() => Strategy::Root,
            Derivation::Basic => Strategy::Basic,
        }
    }

    /// The unattempted concept with the highest priority; ties keep list order.
    fn priority_concept(&self, mandatory: &[Concept], attempted: &BTreeSet<String>) -> Option<Concept> {
        mandatory
            .iter()
            .filter(|c| !attempted.contains(&c.address()))
            .min_by_key(|c| self.strategy(c))
            .cloned()
    }

    fn generate_node(
        &mut self,
        concept: &Concept,
        local_optional: &[Concept],
        depth: usize,
        accept_partial: bool,
    ) -> PlanResult<Option<StrategyNode>> {
        match self.strategy(concept) {
            Strategy::MultiSelect => {
                self.gen_multiselect_node(concept, local_optional, depth + 1, accept_partial)
            }
            Strategy::Filter => self.gen_filter_node(concept, local_optional, depth + 1, accept_partial),
            Strategy::Aggregate => self.gen_group_node(concept, local_optional, depth + 1, accept_partial),
            Strategy::Window => self.gen_window_node(concept, local_optional, depth + 1, accept_partial),
            Strategy::Basic => self.gen_basic_node(concept, local_optional, depth + 1, accept_partial),
            Strategy::Root => self.gen_select_node(concept, local_optional, depth + 1, accept_partial),
            Strategy::Constant => self.gen_select_node_from_table(
                std::slice::from_ref(concept),
                depth + 1,
                accept_partial,
            ),
        }
    }

    /// Whether the stacked nodes cover the request and can all be joined.
    fn validate_stack(
        &self,
        stack: &[StrategyNode],
        mandatory: &[Concept],
        accept_partial: bool,
    ) -> PlanResult<bool> {
        if stack.is_empty() {
            return Ok(false);
        }
        let resolved = stack
            .iter()
            .map(|node| node.resolve())
            .collect::<PlanResult<Vec<_>>>()?;

        for concept in mandatory {
            let address = concept.address();
            let found = resolved.iter().any(|query| {
                if accept_partial {
                    query.output_concepts.iter().any(|c| c.address() == address)
                } else {
                    query.non_partial_concept_addresses().contains(&address)
                }
            });
            if !found {
                return Ok(false);
            }
        }

        if resolved.len() > 1 && !is_connected(&get_node_joins(&resolved), resolved.len()) {
            tracing::debug!(
                "{}{} Stack covers the request but cannot be joined",
                padding(stack[0].depth),
                LOGGER_PREFIX
            );
            return Ok(false);
        }
        Ok(true)
    }
}

/// Plan `mandatory` with a fresh history.
pub fn search_concepts(
    mandatory: &[Concept],
    environment: &Environment,
    graph: &ReferenceGraph,
    settings: &PlannerSettings,
) -> PlanResult<StrategyNode> {
    ConceptPlanner::new(environment, graph)
        .with_settings(settings)
        .search_concepts(mandatory, 0)
}

pub(crate) fn display_addresses(concepts: &[Concept]) -> String {
    concepts
        .iter()
        .map(|c| c.address())
        .collect::<Vec<_>>()
        .join(", ")
}
