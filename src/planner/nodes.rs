//! Strategy nodes: the plan tree produced by the search engine.
//!
//! ```text
//!   Merge ─┬─ Group ── Select(revenue)
//!          └─ Select(products)
//! ```
//!
//! Every node kind shares the same fields; [`StrategyNode::resolve`]
//! dispatches on [`NodeKind`] to produce a [`QueryDatasource`]. Resolution
//! is recomputed from the current fields on every call, so changing a
//! node's outputs never leaves a stale result behind.

use std::collections::BTreeSet;
use std::fmt;

use super::join_builder::{get_node_joins, is_connected, resolve_join_order, NodeJoin};
use crate::error::{PlanError, PlanResult};
use crate::model::{
    and_conditions, concept_list_to_grain, unique_concepts, Concept, Condition, Datasource, Grain,
    JoinType, Purpose, QueryDatasource, Source, SourceMap, SourceType,
};

/// What a node does with its parents.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Leaf. Reads one physical datasource, or nothing for pure constants.
    Select { datasource: Option<Datasource> },
    /// Aggregates its parent to the node grain.
    Group,
    /// Computes window functions over its parent.
    Window,
    /// Applies a row filter and hides the filtered content.
    Filter,
    /// Joins parents on shared concepts. Derives joins when `node_joins` is empty.
    Merge { node_joins: Vec<NodeJoin> },
    /// Joins independent select branches on their aligned concepts.
    MultiSelect { node_joins: Vec<NodeJoin> },
}

impl NodeKind {
    pub fn source_type(&self) -> SourceType {
        match self {
            NodeKind::Select { datasource: Some(_) } => SourceType::DirectSelect,
            NodeKind::Select { datasource: None } => SourceType::Select,
            NodeKind::Group => SourceType::Group,
            NodeKind::Window => SourceType::Window,
            NodeKind::Filter => SourceType::Filter,
            NodeKind::Merge { .. } | NodeKind::MultiSelect { .. } => SourceType::Merge,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Select { .. } => "SelectNode",
            NodeKind::Group => "GroupNode",
            NodeKind::Window => "WindowNode",
            NodeKind::Filter => "FilterNode",
            NodeKind::Merge { .. } => "MergeNode",
            NodeKind::MultiSelect { .. } => "MultiSelectNode",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyNode {
    pub kind: NodeKind,
    pub input_concepts: Vec<Concept>,
    pub output_concepts: Vec<Concept>,
    /// Outputs known to be partial regardless of what the parents report.
    pub partial_concepts: Vec<Concept>,
    pub parents: Vec<StrategyNode>,
    /// Recursion depth the node was generated at. Only used for logging.
    pub depth: usize,
    pub conditions: Option<Condition>,
    /// Overrides the grain derived during resolution.
    pub grain: Option<Grain>,
}

impl StrategyNode {
    fn new(
        kind: NodeKind,
        input_concepts: Vec<Concept>,
        output_concepts: Vec<Concept>,
        parents: Vec<StrategyNode>,
        depth: usize,
    ) -> Self {
        Self {
            kind,
            input_concepts: unique_concepts(input_concepts),
            output_concepts: unique_concepts(output_concepts),
            partial_concepts: Vec::new(),
            parents,
            depth,
            conditions: None,
            grain: None,
        }
    }

    pub fn select(
        datasource: Option<Datasource>,
        input_concepts: Vec<Concept>,
        output_concepts: Vec<Concept>,
        depth: usize,
    ) -> Self {
        Self::new(
            NodeKind::Select { datasource },
            input_concepts,
            output_concepts,
            Vec::new(),
            depth,
        )
    }

    pub fn group(
        input_concepts: Vec<Concept>,
        output_concepts: Vec<Concept>,
        parent: StrategyNode,
        depth: usize,
    ) -> Self {
        Self::new(NodeKind::Group, input_concepts, output_concepts, vec![parent], depth)
    }

    pub fn window(
        input_concepts: Vec<Concept>,
        output_concepts: Vec<Concept>,
        parent: StrategyNode,
        depth: usize,
    ) -> Self {
        Self::new(NodeKind::Window, input_concepts, output_concepts, vec![parent], depth)
    }

    pub fn filter(
        input_concepts: Vec<Concept>,
        output_concepts: Vec<Concept>,
        parent: StrategyNode,
        depth: usize,
    ) -> Self {
        Self::new(NodeKind::Filter, input_concepts, output_concepts, vec![parent], depth)
    }

    pub fn merge(
        input_concepts: Vec<Concept>,
        output_concepts: Vec<Concept>,
        parents: Vec<StrategyNode>,
        node_joins: Vec<NodeJoin>,
        depth: usize,
    ) -> Self {
        Self::new(
            NodeKind::Merge { node_joins },
            input_concepts,
            output_concepts,
            parents,
            depth,
        )
    }

    pub fn multiselect(
        input_concepts: Vec<Concept>,
        output_concepts: Vec<Concept>,
        parents: Vec<StrategyNode>,
        node_joins: Vec<NodeJoin>,
        depth: usize,
    ) -> Self {
        Self::new(
            NodeKind::MultiSelect { node_joins },
            input_concepts,
            output_concepts,
            parents,
            depth,
        )
    }

    pub fn with_partial_concepts(mut self, partial_concepts: Vec<Concept>) -> Self {
        self.partial_concepts = unique_concepts(partial_concepts);
        self
    }

    pub fn with_conditions(mut self, conditions: Option<Condition>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_grain(mut self, grain: Grain) -> Self {
        self.grain = Some(grain);
        self
    }

    /// Replace the outputs. Explicit partial flags are kept for the survivors.
    pub fn with_output_concepts(mut self, output_concepts: Vec<Concept>) -> Self {
        let output_concepts = unique_concepts(output_concepts);
        let keep: BTreeSet<String> = output_concepts.iter().map(|c| c.address()).collect();
        self.partial_concepts.retain(|c| keep.contains(&c.address()));
        self.output_concepts = output_concepts;
        self
    }

    /// Append outputs that are not already present.
    pub fn add_output_concepts(&mut self, concepts: impl IntoIterator<Item = Concept>) {
        let mut outputs = std::mem::take(&mut self.output_concepts);
        outputs.extend(concepts);
        self.output_concepts = unique_concepts(outputs);
    }

    pub fn source_type(&self) -> SourceType {
        self.kind.source_type()
    }

    pub fn output_addresses(&self) -> BTreeSet<String> {
        self.output_concepts.iter().map(|c| c.address()).collect()
    }

    pub fn provides(&self, address: &str) -> bool {
        self.output_concepts.iter().any(|c| c.address() == address)
    }

    /// Resolve the node, and recursively its parents, into a query datasource.
    pub fn resolve(&self) -> PlanResult<QueryDatasource> {
        let resolved = match &self.kind {
            NodeKind::Select {
                datasource: Some(datasource),
            } => self.resolve_datasource(datasource)?,
            NodeKind::Select { datasource: None } => self.resolve_constants()?,
            NodeKind::Merge { node_joins } | NodeKind::MultiSelect { node_joins } => {
                self.resolve_parents(node_joins)?
            }
            NodeKind::Group | NodeKind::Window | NodeKind::Filter => self.resolve_parents(&[])?,
        };
        let condition = and_conditions(resolved.condition.clone(), self.conditions.clone());
        Ok(resolved.with_condition(condition))
    }

    fn resolve_datasource(&self, datasource: &Datasource) -> PlanResult<QueryDatasource> {
        let name = datasource.full_name();
        let mut source_map = SourceMap::new();
        for concept in self.input_concepts.iter().chain(self.output_concepts.iter()) {
            let address = concept.address();
            let entry = source_map.entry(address.clone()).or_default();
            if datasource.provides(&address) {
                entry.insert(name.clone());
            }
        }
        let grain = match &self.grain {
            Some(grain) => grain.clone(),
            None => select_grain(datasource, &self.output_concepts),
        };
        let partial: Vec<Concept> = self
            .output_concepts
            .iter()
            .filter(|c| datasource.is_partial_for(&c.address()))
            .chain(self.partial_concepts.iter())
            .cloned()
            .collect();
        Ok(QueryDatasource::new(
            self.input_concepts.clone(),
            self.output_concepts.clone(),
            source_map,
            vec![Source::Datasource(datasource.clone())],
            grain,
            Vec::new(),
            SourceType::DirectSelect,
        )?
        .with_partial_concepts(partial))
    }

    fn resolve_constants(&self) -> PlanResult<QueryDatasource> {
        let source_map = self
            .input_concepts
            .iter()
            .chain(self.output_concepts.iter())
            .map(|c| (c.address(), BTreeSet::new()))
            .collect();
        QueryDatasource::new(
            self.input_concepts.clone(),
            self.output_concepts.clone(),
            source_map,
            Vec::new(),
            self.grain.clone().unwrap_or_default(),
            Vec::new(),
            SourceType::Select,
        )
    }

    fn resolve_parents(&self, node_joins: &[NodeJoin]) -> PlanResult<QueryDatasource> {
        let resolved = self
            .parents
            .iter()
            .map(|parent| parent.resolve())
            .collect::<PlanResult<Vec<_>>>()?;
        let (parents, index_map) = dedupe_parents(resolved)?;
        let names: Vec<String> = parents.iter().map(|p| p.identifier()).collect();

        let joins = if parents.len() < 2 {
            Vec::new()
        } else {
            let candidates = if node_joins.is_empty() {
                get_node_joins(&parents)
            } else {
                node_joins
                    .iter()
                    .filter_map(|join| {
                        let left = *index_map.get(join.left)?;
                        let right = *index_map.get(join.right)?;
                        (left != right).then(|| NodeJoin {
                            left,
                            right,
                            ..join.clone()
                        })
                    })
                    .collect()
            };
            let ordered = resolve_join_order(candidates, &names)?;
            if !is_connected(&ordered, parents.len()) {
                return Err(PlanError::DisconnectedJoins {
                    available: names.clone(),
                    remaining: unjoined_names(&ordered, &names),
                });
            }
            ordered
        };

        let full_keys: BTreeSet<String> = joins
            .iter()
            .filter(|j| j.join_type == JoinType::Full)
            .flat_map(|j| j.concepts.iter().map(|c| c.address()))
            .collect();

        let mut source_map = SourceMap::new();
        for concept in self.input_concepts.iter().chain(self.output_concepts.iter()) {
            let address = concept.address();
            let providers: Vec<&QueryDatasource> = parents
                .iter()
                .filter(|p| p.output_concepts.iter().any(|c| c.address() == address))
                .collect();
            let chosen = providers
                .iter()
                .find(|p| !is_partial(p, &address))
                .or_else(|| providers.first());
            let entry = source_map.entry(address).or_default();
            if let Some(parent) = chosen {
                entry.insert(parent.identifier());
            }
        }

        let mut partial: Vec<Concept> = self
            .output_concepts
            .iter()
            .filter(|concept| {
                let address = concept.address();
                let mut providers = parents
                    .iter()
                    .filter(|p| p.output_concepts.iter().any(|c| c.address() == address))
                    .peekable();
                providers.peek().is_some()
                    && providers.all(|p| is_partial(p, &address))
                    && !full_keys.contains(&address)
            })
            .cloned()
            .collect();
        partial.extend(self.partial_concepts.iter().cloned());

        let grain = match &self.grain {
            Some(grain) => grain.clone(),
            None => match self.kind {
                NodeKind::Group => concept_list_to_grain(&self.output_concepts),
                _ => parents.iter().map(|p| p.grain.clone()).sum(),
            },
        };

        let sources: Vec<Source> = parents.into_iter().map(Source::from).collect();
        let base_joins = joins
            .iter()
            .map(|join| join.to_base_join(&sources))
            .collect::<PlanResult<Vec<_>>>()?;

        Ok(QueryDatasource::new(
            self.input_concepts.clone(),
            self.output_concepts.clone(),
            source_map,
            sources,
            grain,
            base_joins,
            self.source_type(),
        )?
        .with_partial_concepts(partial))
    }
}

impl fmt::Display for StrategyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outputs: Vec<String> = self.output_concepts.iter().map(|c| c.address()).collect();
        write!(f, "{}<{}>", self.kind.label(), outputs.join(","))
    }
}

fn is_partial(source: &QueryDatasource, address: &str) -> bool {
    source.partial_concepts.iter().any(|c| c.address() == address)
}

fn unjoined_names(joins: &[NodeJoin], names: &[String]) -> Vec<String> {
    let joined: BTreeSet<usize> = joins.iter().flat_map(|j| [j.left, j.right]).collect();
    names
        .iter()
        .enumerate()
        .filter(|(index, _)| !joined.contains(index))
        .map(|(_, name)| name.clone())
        .collect()
}

/// Merge parents that resolved to the same identifier. Returns the
/// surviving parents and, for each original position, its new index.
fn dedupe_parents(resolved: Vec<QueryDatasource>) -> PlanResult<(Vec<QueryDatasource>, Vec<usize>)> {
    let mut parents: Vec<QueryDatasource> = Vec::new();
    let mut index_map = Vec::with_capacity(resolved.len());
    for source in resolved {
        let identifier = source.identifier();
        match parents.iter().position(|p| p.identifier() == identifier) {
            Some(index) => {
                parents[index] = parents[index].merge(&source)?;
                index_map.push(index);
            }
            None => {
                index_map.push(parents.len());
                parents.push(source);
            }
        }
    }
    Ok((parents, index_map))
}

/// Grain of a direct select.
///
/// Rows stay at the datasource grain when any output is row-level: a metric,
/// or a concept whose own grain overlaps the datasource grain. Otherwise the
/// outputs describe a coarser entity and the select is reduced to their grain.
fn select_grain(datasource: &Datasource, outputs: &[Concept]) -> Grain {
    if datasource.grain.is_abstract() {
        return datasource.grain.clone();
    }
    let datasource_keys = datasource.grain.addresses();
    let row_level = outputs.iter().any(|c| {
        c.purpose == Purpose::Metric || !c.default_grain().addresses().is_disjoint(&datasource_keys)
    });
    if row_level {
        datasource.grain.clone()
    } else {
        concept_list_to_grain(outputs)
    }
}
