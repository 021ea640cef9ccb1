//! Multi-select rowsets.
//!
//! Each branch select is planned on its own, tagged with the merge concepts
//! its outputs align into, then the branches are FULL joined on those merge
//! concepts.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::PlanResult;
use crate::model::{and_conditions, concept_list_to_grain, Concept, JoinType, Lineage, MultiSelect, Purpose};
use crate::planner::join_builder::{resolve_join_order, NodeJoin};
use crate::planner::nodes::StrategyNode;
use crate::planner::search::{padding, ConceptPlanner};

const LOGGER_PREFIX: &str = "[GEN_ROWSET_NODE]";

/// FULL joins between every pair of branches sharing an aligned concept.
fn extra_align_joins(multiselect: &MultiSelect, branches: &[StrategyNode]) -> PlanResult<Vec<NodeJoin>> {
    let mut merge_map: BTreeMap<usize, Vec<Concept>> = BTreeMap::new();
    for item in &multiselect.align.items {
        let merged = item.gen_concept(multiselect);
        for (index, branch) in branches.iter().enumerate() {
            if item.concepts.iter().any(|c| branch.provides(&c.address())) {
                merge_map.entry(index).or_default().push(merged.clone());
            }
        }
    }

    let indices: Vec<usize> = merge_map.keys().copied().collect();
    let mut joins = Vec::new();
    for (position, &left) in indices.iter().enumerate() {
        for &right in &indices[position + 1..] {
            let right_keys: BTreeSet<String> =
                merge_map[&right].iter().map(|c| c.address()).collect();
            let shared: Vec<Concept> = merge_map[&left]
                .iter()
                .filter(|c| right_keys.contains(&c.address()))
                .cloned()
                .collect();
            if !shared.is_empty() {
                joins.push(NodeJoin::new(left, right, shared, JoinType::Full));
            }
        }
    }
    let names: Vec<String> = branches.iter().map(|b| b.to_string()).collect();
    resolve_join_order(joins, &names)
}

impl<'a> ConceptPlanner<'a> {
    pub(crate) fn gen_multiselect_node(
        &mut self,
        concept: &Concept,
        local_optional: &[Concept],
        depth: usize,
        accept_partial: bool,
    ) -> PlanResult<Option<StrategyNode>> {
        let Some(Lineage::MultiSelect(multiselect)) = concept.lineage.as_deref() else {
            return Ok(None);
        };

        let mut branches = Vec::with_capacity(multiselect.selects.len());
        let mut filtered_outputs: Vec<Concept> = Vec::new();
        for select in &multiselect.selects {
            let outputs = select.output_components();
            let Some(branch) = self.search(&outputs, depth + 1, accept_partial)? else {
                tracing::info!(
                    "{}{} Cannot generate branch for {}",
                    padding(depth),
                    LOGGER_PREFIX,
                    concept.address()
                );
                return Ok(None);
            };
            let condition = select.where_clause.as_ref().map(|w| w.conditional.clone());
            if condition.is_some() {
                filtered_outputs.extend(outputs.iter().cloned());
            }
            let branch_conditions = and_conditions(branch.conditions.clone(), condition);
            let mut branch = branch.with_conditions(branch_conditions);
            let merged: Vec<Concept> = branch
                .output_concepts
                .iter()
                .filter_map(|c| multiselect.get_merge_concept(c))
                .collect();
            branch.add_output_concepts(merged);
            branches.push(branch);
        }

        let node_joins = extra_align_joins(multiselect, &branches)?;
        let branch_outputs: Vec<Concept> = branches
            .iter()
            .flat_map(|b| b.output_concepts.iter().cloned())
            .collect();

        let wanted: BTreeSet<String> = local_optional
            .iter()
            .map(|c| c.address())
            .chain(std::iter::once(concept.address()))
            .collect();
        let derived = multiselect.derived_concepts();
        let relevant_derived: Vec<Concept> = derived
            .iter()
            .filter(|c| wanted.contains(&c.address()))
            .cloned()
            .collect();
        let additional: Vec<Concept> = multiselect
            .concept_arguments()
            .into_iter()
            .filter(|c| wanted.contains(&c.address()))
            .collect();
        let filtered: BTreeSet<String> = filtered_outputs.iter().map(|c| c.address()).collect();
        let partial: Vec<Concept> = additional
            .iter()
            .filter(|c| filtered.contains(&c.address()))
            .cloned()
            .collect();

        let mut outputs = branch_outputs.clone();
        outputs.extend(relevant_derived);
        outputs.extend(additional.iter().cloned());

        let merge_keys: Vec<Concept> = derived
            .into_iter()
            .filter(|c| c.purpose != Purpose::Metric)
            .collect();
        let grain = match concept_list_to_grain(&merge_keys) {
            grain if grain.is_abstract() => concept_list_to_grain(&outputs),
            grain => grain,
        };
        tracing::debug!(
            "{}{} Aligned {} branches at {}",
            padding(depth),
            LOGGER_PREFIX,
            branches.len(),
            grain
        );
        let node = StrategyNode::multiselect(branch_outputs, outputs, branches, node_joins, depth)
            .with_grain(grain)
            .with_partial_concepts(partial);

        let join_keys: Vec<Concept> = additional
            .into_iter()
            .filter(|c| c.purpose == Purpose::Key)
            .collect();
        self.enrich(node, join_keys, local_optional, depth, accept_partial, LOGGER_PREFIX)
            .map(Some)
    }
}
