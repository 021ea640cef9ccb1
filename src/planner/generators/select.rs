//! Leaf nodes read straight from datasources.

use std::collections::BTreeSet;

use super::combinations;
use crate::error::PlanResult;
use crate::graph::{concept_address, concept_node, is_datasource_node};
use crate::model::{Concept, Datasource, Purpose};
use crate::planner::nodes::StrategyNode;
use crate::planner::search::{display_addresses, padding, ConceptPlanner};

const LOGGER_PREFIX: &str = "[GEN_SELECT_NODE]";

impl<'a> ConceptPlanner<'a> {
    /// Whether `datasource` provides every concept without a join.
    ///
    /// Each path from the datasource must hold exactly one datasource node,
    /// and no concept node other than its target.
    fn datasource_covers(&self, datasource: &Datasource, concepts: &[Concept]) -> PlanResult<bool> {
        for concept in concepts {
            let address = concept.address();
            if !self.graph.contains_node(&concept_node(&address)) {
                return Ok(false);
            }
            let Some(path) = self.graph.datasource_path(&datasource.identifier, &address)? else {
                return Ok(false);
            };
            let datasource_nodes = path.iter().filter(|node| is_datasource_node(node)).count();
            let stray = path
                .iter()
                .filter_map(|node| concept_address(node))
                .any(|on_path| on_path != address);
            if datasource_nodes != 1 || stray {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// A select over the first datasource, in declaration order, that
    /// provides every concept directly.
    pub(crate) fn gen_select_node_from_table(
        &mut self,
        all_concepts: &[Concept],
        depth: usize,
        accept_partial: bool,
    ) -> PlanResult<Option<StrategyNode>> {
        if all_concepts.is_empty() {
            return Ok(None);
        }
        if all_concepts.iter().all(|c| c.purpose == Purpose::Constant) {
            tracing::debug!(
                "{}{} All concepts are constant, returning constant select",
                padding(depth),
                LOGGER_PREFIX
            );
            return Ok(Some(StrategyNode::select(
                None,
                all_concepts.to_vec(),
                all_concepts.to_vec(),
                depth,
            )));
        }

        let environment = self.environment;
        for datasource in environment.datasources() {
            if !self.datasource_covers(datasource, all_concepts)? {
                continue;
            }
            let partial = all_concepts
                .iter()
                .any(|c| datasource.is_partial_for(&c.address()));
            if partial && !accept_partial {
                tracing::debug!(
                    "{}{} Skipping {}: partial coverage",
                    padding(depth),
                    LOGGER_PREFIX,
                    datasource.identifier
                );
                continue;
            }
            tracing::debug!(
                "{}{} Found direct select for [{}] on {}",
                padding(depth),
                LOGGER_PREFIX,
                display_addresses(all_concepts),
                datasource.identifier
            );
            return Ok(Some(StrategyNode::select(
                Some(datasource.clone()),
                datasource.concepts(),
                all_concepts.to_vec(),
                depth,
            )));
        }
        Ok(None)
    }

    /// Select `concept`, pulling in as many optional concepts as possible.
    ///
    /// Tries every concept from one table first. Otherwise, when `concept`
    /// can act as a join key, tries decreasing combinations of the optional
    /// concepts with it and merges what it finds.
    pub(crate) fn gen_select_node(
        &mut self,
        concept: &Concept,
        local_optional: &[Concept],
        depth: usize,
        accept_partial: bool,
    ) -> PlanResult<Option<StrategyNode>> {
        let mut all_concepts = vec![concept.clone()];
        all_concepts.extend(local_optional.iter().cloned());

        if all_concepts
            .iter()
            .any(|c| c.purpose != Purpose::Constant && !self.environment.is_materialized(&c.address()))
        {
            tracing::debug!(
                "{}{} Not all of [{}] are materialized",
                padding(depth),
                LOGGER_PREFIX,
                display_addresses(&all_concepts)
            );
            if !self.environment.is_materialized(&concept.address()) {
                return Ok(None);
            }
        } else if let Some(node) = self.gen_select_node_from_table(&all_concepts, depth, accept_partial)? {
            return Ok(Some(node));
        }

        let mut parents: Vec<StrategyNode> = Vec::new();
        let mut found: BTreeSet<String> = BTreeSet::new();
        let joinable = !matches!(concept.purpose, Purpose::Metric | Purpose::Constant);
        if joinable {
            let materialized: Vec<Concept> = local_optional
                .iter()
                .filter(|c| self.environment.is_materialized(&c.address()))
                .cloned()
                .collect();
            for size in (1..=materialized.len()).rev() {
                for combo in combinations(&materialized, size) {
                    let remaining: Vec<Concept> = combo
                        .into_iter()
                        .filter(|c| !found.contains(&c.address()))
                        .collect();
                    if remaining.is_empty() {
                        continue;
                    }
                    let mut request = vec![concept.clone()];
                    request.extend(remaining);
                    if let Some(node) = self.gen_select_node_from_table(&request, depth, accept_partial)? {
                        found.extend(node.output_addresses());
                        parents.push(node);
                    }
                }
                if local_optional.iter().all(|c| found.contains(&c.address())) {
                    break;
                }
            }
        }

        let all_found = local_optional.iter().all(|c| found.contains(&c.address()));
        if !parents.is_empty() && (all_found || self.accept_partial_optional) {
            tracing::debug!(
                "{}{} Found {} partial select(s) for {}",
                padding(depth),
                LOGGER_PREFIX,
                parents.len(),
                concept.address()
            );
            if parents.len() == 1 {
                return Ok(parents.pop());
            }
            let outputs: Vec<Concept> = parents
                .iter()
                .flat_map(|p| p.output_concepts.iter().cloned())
                .collect();
            return Ok(Some(StrategyNode::merge(
                outputs.clone(),
                outputs,
                parents,
                Vec::new(),
                depth,
            )));
        }

        if !self.accept_partial_optional {
            return Ok(None);
        }
        self.gen_select_node_from_table(std::slice::from_ref(concept), depth, accept_partial)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::PlannerSettings;
    use crate::environment::{Environment, EnvironmentBuilder};
    use crate::graph::ReferenceGraph;
    use crate::model::{ColumnAssignment, Concept, DataType, Datasource};
    use crate::planner::search::ConceptPlanner;

    fn key(name: &str) -> Concept {
        Concept::key(name, DataType::Integer)
    }

    /// `b` is only reachable from `k` through `a`.
    fn chained_environment() -> Environment {
        let mut builder = EnvironmentBuilder::new();
        for (identifier, names) in [("ds1", ["k", "a"]), ("ds2", ["a", "b"])] {
            let columns = names
                .iter()
                .map(|name| ColumnAssignment::new(*name, key(name)))
                .collect();
            builder.add_datasource(Datasource::table(identifier, columns)).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_partial_optional_coverage_follows_setting() {
        let env = chained_environment();
        let graph = ReferenceGraph::from_environment(&env);
        let optional = vec![key("a"), key("b")];

        let mut lenient = ConceptPlanner::new(&env, &graph);
        let node = lenient
            .gen_select_node(&key("k"), &optional, 0, false)
            .unwrap()
            .unwrap();
        assert!(node.provides("local.a"));
        assert!(!node.provides("local.b"));

        let strict_settings = PlannerSettings::default().with_accept_partial_optional(false);
        let mut strict = ConceptPlanner::new(&env, &graph).with_settings(&strict_settings);
        assert!(strict
            .gen_select_node(&key("k"), &optional, 0, false)
            .unwrap()
            .is_none());
        // with every optional reachable the strict planner still selects
        assert!(strict
            .gen_select_node(&key("k"), &[key("a")], 0, false)
            .unwrap()
            .is_some());
    }
}
