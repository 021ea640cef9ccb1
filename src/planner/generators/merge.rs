//! Join-path discovery across datasources.
//!
//! For each datasource the planner finds the shortest graph path to every
//! requested concept. The concepts along a path are what a join through
//! that datasource would need; the smallest such set is searched for as a
//! whole, which lets the select and merge generators join it.
//!
//! ```text
//! ds~revenue ──► c~product_id ──► ds~products ──► c~category_id
//!      │
//!      └──────► c~amount
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{PlanError, PlanResult};
use crate::graph::{concept_address, concept_node, is_datasource_node};
use crate::model::{Concept, Datasource};
use crate::planner::nodes::StrategyNode;
use crate::planner::search::{display_addresses, padding, ConceptPlanner};

const LOGGER_PREFIX: &str = "[GEN_MERGE_NODE]";

/// Paths from one datasource to every requested concept.
struct PathInfo {
    datasource: String,
    paths: BTreeMap<String, Vec<String>>,
}

impl PathInfo {
    fn total_length(&self) -> usize {
        self.paths.values().map(|path| path.len()).sum()
    }

    /// Every concept a join along these paths touches.
    fn concept_addresses(&self) -> BTreeSet<String> {
        self.paths
            .values()
            .flatten()
            .filter_map(|node| concept_address(node))
            .map(str::to_string)
            .collect()
    }
}

fn is_nested(left: &BTreeSet<String>, right: &BTreeSet<String>) -> bool {
    left.is_subset(right) || right.is_subset(left)
}

impl<'a> ConceptPlanner<'a> {
    fn identify_join_paths(
        &self,
        all_concepts: &[Concept],
        datasource: &Datasource,
        accept_partial: bool,
    ) -> PlanResult<Option<PathInfo>> {
        let mut paths = BTreeMap::new();
        let mut any_direct = false;
        for concept in all_concepts {
            let address = concept.address();
            if !self.graph.contains_node(&concept_node(&address)) {
                return Ok(None);
            }
            let Some(path) = self.graph.datasource_path(&datasource.identifier, &address)? else {
                return Ok(None);
            };
            if path.iter().filter(|node| is_datasource_node(node)).count() == 1 {
                any_direct = true;
            }
            paths.insert(address, path);
        }
        if !any_direct {
            return Ok(None);
        }
        let partial = all_concepts
            .iter()
            .any(|c| datasource.is_partial_for(&c.address()));
        if partial && !accept_partial {
            return Ok(None);
        }
        Ok(Some(PathInfo {
            datasource: datasource.identifier.clone(),
            paths,
        }))
    }

    /// Extend the request with the join concepts of the shortest path set.
    ///
    /// # Errors
    /// [`PlanError::AmbiguousRelationship`] when two candidate path sets are
    /// not nested in each other.
    pub(crate) fn gen_merge_node(
        &mut self,
        all_concepts: &[Concept],
        depth: usize,
        accept_partial: bool,
    ) -> PlanResult<Option<StrategyNode>> {
        let environment = self.environment;
        let mut candidates = Vec::new();
        for datasource in environment.datasources() {
            if let Some(info) = self.identify_join_paths(all_concepts, datasource, accept_partial)? {
                candidates.push(info);
            }
        }
        if candidates.is_empty() {
            tracing::debug!(
                "{}{} No join paths reach [{}]",
                padding(depth),
                LOGGER_PREFIX,
                display_addresses(all_concepts)
            );
            return Ok(None);
        }
        candidates.sort_by_key(PathInfo::total_length);

        let mut join_additions: Vec<BTreeSet<String>> = Vec::new();
        for candidate in &candidates {
            tracing::debug!(
                "{}{} {} reaches the request in {} hops",
                padding(depth),
                LOGGER_PREFIX,
                candidate.datasource,
                candidate.total_length()
            );
            let addresses = candidate.concept_addresses();
            if !join_additions.contains(&addresses) {
                join_additions.push(addresses);
            }
        }

        let all_nested = join_additions
            .iter()
            .enumerate()
            .all(|(i, left)| join_additions[i + 1..].iter().all(|right| is_nested(left, right)));
        if !all_nested {
            return Err(PlanError::AmbiguousRelationship {
                candidates: join_additions
                    .into_iter()
                    .map(|set| set.into_iter().collect())
                    .collect(),
            });
        }

        let requested: BTreeSet<String> = all_concepts.iter().map(|c| c.address()).collect();
        let Some(shortest) = join_additions.iter().min_by_key(|set| set.len()) else {
            return Ok(None);
        };
        if *shortest == requested {
            return Ok(None);
        }

        let mut final_concepts = all_concepts.to_vec();
        for address in shortest.difference(&requested) {
            final_concepts.push(environment.concept(address)?.clone());
        }
        tracing::info!(
            "{}{} Adding join concepts: [{}]",
            padding(depth),
            LOGGER_PREFIX,
            shortest
                .difference(&requested)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.search(&final_concepts, depth + 1, accept_partial)
    }
}
