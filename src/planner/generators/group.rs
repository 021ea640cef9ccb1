//! Aggregates.

use crate::error::PlanResult;
use crate::model::{and_conditions, Concept, Derivation, Grain, Purpose};
use crate::planner::nodes::StrategyNode;
use crate::planner::search::{display_addresses, padding, ConceptPlanner};

const LOGGER_PREFIX: &str = "[GEN_GROUP_NODE]";

fn is_aggregate_like(concept: &Concept) -> bool {
    concept.purpose == Purpose::Metric || concept.derivation() == Derivation::Aggregate
}

impl<'a> ConceptPlanner<'a> {
    /// Aggregate `concept` to its grain.
    ///
    /// An aggregate with an abstract grain is grouped by the non-metric
    /// optional concepts instead, so that it can be returned alongside them.
    /// When the planner carries a row filter for `concept`, the parent is
    /// searched with the filter arguments and filtered before grouping.
    pub(crate) fn gen_group_node(
        &mut self,
        concept: &Concept,
        local_optional: &[Concept],
        depth: usize,
        accept_partial: bool,
    ) -> PlanResult<Option<StrategyNode>> {
        let grain = if concept.grain.is_abstract() {
            Grain::new(
                local_optional
                    .iter()
                    .filter(|c| !is_aggregate_like(c))
                    .cloned(),
            )
        } else {
            concept.grain.clone()
        };
        let grain_components = grain.components().to_vec();

        let mut parent_concepts = concept.concept_arguments();
        parent_concepts.extend(grain_components.iter().cloned());
        let pushed = self
            .row_filter
            .as_ref()
            .filter(|filter| filter.applies_to(concept))
            .map(|filter| filter.condition.clone());
        let mut parent = None;
        if let Some(condition) = pushed {
            let mut filtered_concepts = parent_concepts.clone();
            filtered_concepts.extend(condition.concept_arguments());
            if let Some(node) = self.search(&filtered_concepts, depth + 1, accept_partial)? {
                tracing::debug!(
                    "{}{} Filtering inputs of {} before grouping",
                    padding(depth),
                    LOGGER_PREFIX,
                    concept.address()
                );
                let conditions = and_conditions(node.conditions.clone(), Some(condition));
                parent = Some(node.with_conditions(conditions));
                parent_concepts = filtered_concepts;
            }
        }
        let parent = match parent {
            Some(parent) => parent,
            None => match self.search(&parent_concepts, depth + 1, accept_partial)? {
                Some(parent) => parent,
                None => {
                    tracing::debug!(
                        "{}{} Cannot find parents for {} from [{}]",
                        padding(depth),
                        LOGGER_PREFIX,
                        concept.address(),
                        display_addresses(&parent_concepts)
                    );
                    return Ok(None);
                }
            },
        };

        let output = if concept.grain.is_abstract() && !grain.is_abstract() {
            concept.with_grain(grain.clone())
        } else {
            concept.clone()
        };
        let mut outputs = vec![output];
        outputs.extend(grain_components.iter().cloned());
        tracing::debug!(
            "{}{} Grouping {} to {}",
            padding(depth),
            LOGGER_PREFIX,
            concept.address(),
            grain
        );
        let node = StrategyNode::group(parent_concepts, outputs, parent, depth).with_grain(grain);

        let remaining: Vec<Concept> = local_optional
            .iter()
            .filter(|c| !is_aggregate_like(c))
            .cloned()
            .collect();
        self.enrich(
            node,
            grain_components,
            &remaining,
            depth,
            accept_partial,
            LOGGER_PREFIX,
        )
        .map(Some)
    }
}
