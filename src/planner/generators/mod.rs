//! Node generators, one per derivation.
//!
//! Every generator is a method on [`ConceptPlanner`] that returns
//! `Ok(None)` when it cannot produce a node, so the search can try the next
//! option. Errors are reserved for plans that are provably wrong.

mod basic;
mod filter;
mod group;
mod merge;
mod multiselect;
mod select;
mod window;

use std::collections::BTreeSet;

use super::join_builder::NodeJoin;
use super::nodes::StrategyNode;
use super::search::{display_addresses, padding, ConceptPlanner};
use crate::error::PlanResult;
use crate::model::{Concept, JoinType};

/// All `size`-element combinations of `items`, in lexicographic index order.
pub(crate) fn combinations<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    if size == 0 || size > items.len() {
        return Vec::new();
    }
    let mut output = Vec::new();
    let mut indices: Vec<usize> = (0..size).collect();
    loop {
        output.push(indices.iter().map(|&i| items[i].clone()).collect());
        // advance the rightmost index that still has room
        let mut position = size;
        while position > 0 {
            position -= 1;
            if indices[position] < items.len() - size + position {
                indices[position] += 1;
                for next in position + 1..size {
                    indices[next] = indices[next - 1] + 1;
                }
                break;
            }
            if position == 0 {
                return output;
            }
        }
    }
}

impl<'a> ConceptPlanner<'a> {
    /// Join optional concepts the node does not already provide onto it.
    ///
    /// The extra concepts are searched together with `join_keys`, then left
    /// joined onto `node` on those keys. When the extras cannot be found the
    /// plain node is returned.
    pub(super) fn enrich(
        &mut self,
        node: StrategyNode,
        join_keys: Vec<Concept>,
        local_optional: &[Concept],
        depth: usize,
        accept_partial: bool,
        prefix: &str,
    ) -> PlanResult<StrategyNode> {
        let provided = node.output_addresses();
        let missing: Vec<Concept> = local_optional
            .iter()
            .filter(|c| !provided.contains(&c.address()))
            .cloned()
            .collect();
        if missing.is_empty() || join_keys.is_empty() {
            return Ok(node);
        }

        let mut request = join_keys.clone();
        request.extend(missing.iter().cloned());
        let Some(enrich_node) = self.search(&request, depth + 1, accept_partial)? else {
            tracing::info!(
                "{}{} Cannot generate enrichment node for [{}], returning plain node",
                padding(depth),
                prefix,
                display_addresses(&missing)
            );
            return Ok(node);
        };
        tracing::debug!(
            "{}{} Enriching {} with [{}] on [{}]",
            padding(depth),
            prefix,
            node,
            display_addresses(&missing),
            display_addresses(&join_keys)
        );

        let enrich_outputs: BTreeSet<String> = enrich_node.output_addresses();
        let join_keys: Vec<Concept> = join_keys
            .into_iter()
            .filter(|key| enrich_outputs.contains(&key.address()))
            .collect();
        let join_type = if join_keys.is_empty() {
            JoinType::Cross
        } else {
            JoinType::LeftOuter
        };

        let mut inputs = node.output_concepts.clone();
        inputs.extend(enrich_node.output_concepts.iter().cloned());
        let mut outputs = node.output_concepts.clone();
        outputs.extend(missing);
        let partial = node.partial_concepts.clone();
        Ok(StrategyNode::merge(
            inputs,
            outputs,
            vec![node, enrich_node],
            vec![NodeJoin::new(0, 1, join_keys, join_type)],
            depth,
        )
        .with_partial_concepts(partial))
    }
}
