//! Window functions.

use crate::error::PlanResult;
use crate::model::{Concept, Grain, Lineage};
use crate::planner::nodes::StrategyNode;
use crate::planner::search::{padding, ConceptPlanner};

const LOGGER_PREFIX: &str = "[GEN_WINDOW_NODE]";

impl<'a> ConceptPlanner<'a> {
    pub(crate) fn gen_window_node(
        &mut self,
        concept: &Concept,
        local_optional: &[Concept],
        depth: usize,
        accept_partial: bool,
    ) -> PlanResult<Option<StrategyNode>> {
        let Some(Lineage::Window(window)) = concept.lineage.as_deref() else {
            return Ok(None);
        };
        let parent_concepts = window.arguments();
        let Some(parent) = self.search(&parent_concepts, depth + 1, accept_partial)? else {
            tracing::debug!(
                "{}{} Cannot find parents for {}",
                padding(depth),
                LOGGER_PREFIX,
                concept.address()
            );
            return Ok(None);
        };

        // partitions plus the windowed content
        let grain = Grain::new(
            window
                .over
                .iter()
                .cloned()
                .chain(std::iter::once(window.content.clone())),
        );
        let join_keys = grain.components().to_vec();
        let mut outputs = vec![concept.clone()];
        outputs.extend(parent_concepts.iter().cloned());
        let node = StrategyNode::window(parent_concepts, outputs, parent, depth).with_grain(grain);

        self.enrich(node, join_keys, local_optional, depth, accept_partial, LOGGER_PREFIX)
            .map(Some)
    }
}
