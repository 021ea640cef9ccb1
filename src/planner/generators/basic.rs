//! Row-level derived concepts.

use crate::error::PlanResult;
use crate::model::Concept;
use crate::planner::nodes::StrategyNode;
use crate::planner::search::{padding, ConceptPlanner};

const LOGGER_PREFIX: &str = "[GEN_BASIC_NODE]";

impl<'a> ConceptPlanner<'a> {
    /// Compute `concept` over a parent providing its arguments and the
    /// optional concepts.
    pub(crate) fn gen_basic_node(
        &mut self,
        concept: &Concept,
        local_optional: &[Concept],
        depth: usize,
        accept_partial: bool,
    ) -> PlanResult<Option<StrategyNode>> {
        let mut parent_concepts = concept.concept_arguments();
        parent_concepts.extend(local_optional.iter().cloned());
        let Some(parent) = self.search(&parent_concepts, depth + 1, accept_partial)? else {
            tracing::debug!(
                "{}{} Cannot find parents for {}",
                padding(depth),
                LOGGER_PREFIX,
                concept.address()
            );
            return Ok(None);
        };

        let inputs = parent.output_concepts.clone();
        let mut outputs = vec![concept.clone()];
        outputs.extend(inputs.iter().cloned());
        tracing::debug!(
            "{}{} Computing {} over {}",
            padding(depth),
            LOGGER_PREFIX,
            concept.address(),
            parent
        );
        Ok(Some(StrategyNode::merge(
            inputs,
            outputs,
            vec![parent],
            Vec::new(),
            depth,
        )))
    }
}
