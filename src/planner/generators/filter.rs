//! Filtered concepts.
//!
//! The filtered content is never an output: a filtered concept only exposes
//! the rows that pass the predicate, under its own name.

use crate::error::PlanResult;
use crate::model::{Concept, Grain, Lineage};
use crate::planner::nodes::StrategyNode;
use crate::planner::search::{padding, ConceptPlanner};

const LOGGER_PREFIX: &str = "[GEN_FILTER_NODE]";

impl<'a> ConceptPlanner<'a> {
    pub(crate) fn gen_filter_node(
        &mut self,
        concept: &Concept,
        local_optional: &[Concept],
        depth: usize,
        accept_partial: bool,
    ) -> PlanResult<Option<StrategyNode>> {
        let Some(Lineage::Filter(filter)) = concept.lineage.as_deref() else {
            return Ok(None);
        };
        let content_address = filter.content.address();
        let keys: Vec<Concept> = filter
            .content
            .grain
            .components()
            .iter()
            .filter(|c| c.address() != content_address)
            .cloned()
            .collect();

        let mut parent_concepts = vec![filter.content.clone()];
        parent_concepts.extend(filter.where_clause.concept_arguments());
        parent_concepts.extend(keys.iter().cloned());
        let Some(parent) = self.search(&parent_concepts, depth + 1, accept_partial)? else {
            tracing::debug!(
                "{}{} Cannot find parents for {}",
                padding(depth),
                LOGGER_PREFIX,
                concept.address()
            );
            return Ok(None);
        };

        let mut outputs = vec![concept.clone()];
        outputs.extend(keys.iter().cloned());
        let grain = if keys.is_empty() {
            concept.grain.clone()
        } else {
            Grain::new(keys.clone())
        };
        tracing::debug!(
            "{}{} Filtering {} into {}",
            padding(depth),
            LOGGER_PREFIX,
            content_address,
            concept.address()
        );
        let node = StrategyNode::filter(parent_concepts, outputs, parent, depth)
            .with_conditions(Some(filter.where_clause.conditional.clone()))
            .with_grain(grain);

        self.enrich(node, keys, local_optional, depth, accept_partial, LOGGER_PREFIX)
            .map(Some)
    }
}
