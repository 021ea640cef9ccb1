//! Joins between the resolved parents of a merge.
//!
//! Parents are referenced by position. [`get_node_joins`] derives joins from
//! the concepts two parents share, and [`resolve_join_order`] orders them so
//! every join after the first attaches one new parent to those already
//! joined.

use std::collections::BTreeSet;

use crate::error::{PlanError, PlanResult};
use crate::model::{BaseJoin, Concept, JoinType, Purpose, QueryDatasource, Source};

/// A join between two parents of a strategy node, by parent index.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeJoin {
    pub left: usize,
    pub right: usize,
    pub concepts: Vec<Concept>,
    pub join_type: JoinType,
    /// Drop keys missing from either side instead of failing.
    pub filter_to_mutual: bool,
}

impl NodeJoin {
    pub fn new(left: usize, right: usize, concepts: Vec<Concept>, join_type: JoinType) -> Self {
        Self {
            left,
            right,
            concepts,
            join_type,
            filter_to_mutual: false,
        }
    }

    pub fn with_filter_to_mutual(mut self, filter_to_mutual: bool) -> Self {
        self.filter_to_mutual = filter_to_mutual;
        self
    }

    /// Swap sides, keeping the join's meaning.
    pub fn flipped(self) -> Self {
        let join_type = match self.join_type {
            JoinType::LeftOuter => JoinType::RightOuter,
            JoinType::RightOuter => JoinType::LeftOuter,
            other => other,
        };
        Self {
            left: self.right,
            right: self.left,
            join_type,
            ..self
        }
    }

    /// Validate against the resolved sources.
    pub fn to_base_join(&self, sources: &[Source]) -> PlanResult<BaseJoin> {
        let missing = |index: usize| PlanError::DisconnectedJoins {
            available: sources.iter().map(|s| s.name()).collect(),
            remaining: vec![index.to_string()],
        };
        let left = sources.get(self.left).ok_or_else(|| missing(self.left))?;
        let right = sources.get(self.right).ok_or_else(|| missing(self.right))?;
        BaseJoin::new(
            left,
            right,
            self.concepts.clone(),
            self.join_type,
            self.filter_to_mutual,
        )
    }
}

/// Whether a resolved source can only be cross joined.
fn is_keyless(source: &QueryDatasource) -> bool {
    source.grain.is_abstract()
        || source
            .output_concepts
            .iter()
            .all(|c| c.purpose == Purpose::Constant)
}

fn is_join_key(concept: &Concept) -> bool {
    !matches!(concept.purpose, Purpose::Metric | Purpose::Constant)
}

/// Derive joins between every pair of parents from their shared concepts.
///
/// Parents with fewer partial concepts go on the left. A key that is
/// partial on either side makes the join FULL; a constant or abstract-grain
/// side makes it CROSS; otherwise it is LEFT OUTER. Pairs sharing no key
/// get no join.
pub fn get_node_joins(parents: &[QueryDatasource]) -> Vec<NodeJoin> {
    let mut order: Vec<usize> = (0..parents.len()).collect();
    order.sort_by_key(|index| parents[*index].partial_concepts.len());

    let mut joins = Vec::new();
    for (position, &left) in order.iter().enumerate() {
        for &right in &order[position + 1..] {
            let (left_source, right_source) = (&parents[left], &parents[right]);
            if is_keyless(left_source) || is_keyless(right_source) {
                joins.push(NodeJoin::new(left, right, Vec::new(), JoinType::Cross));
                continue;
            }
            let right_outputs: BTreeSet<String> = right_source
                .output_concepts
                .iter()
                .map(|c| c.address())
                .collect();
            let keys: Vec<Concept> = left_source
                .output_concepts
                .iter()
                .filter(|c| is_join_key(c) && right_outputs.contains(&c.address()))
                .cloned()
                .collect();
            if keys.is_empty() {
                continue;
            }
            let partial: BTreeSet<String> = left_source
                .partial_concepts
                .iter()
                .chain(right_source.partial_concepts.iter())
                .map(|c| c.address())
                .collect();
            let join_type = if keys.iter().any(|k| partial.contains(&k.address())) {
                JoinType::Full
            } else {
                JoinType::LeftOuter
            };
            joins.push(NodeJoin::new(left, right, keys, join_type));
        }
    }
    joins
}

/// Order joins so each one attaches a parent to the already-joined set.
///
/// Runs to a fixed point. A pass that places no join means the remaining
/// joins are disconnected from the rest, which is an error. `names` labels
/// parents in that error.
pub fn resolve_join_order(joins: Vec<NodeJoin>, names: &[String]) -> PlanResult<Vec<NodeJoin>> {
    let label = |index: &usize| {
        names
            .get(*index)
            .cloned()
            .unwrap_or_else(|| index.to_string())
    };

    let mut available: BTreeSet<usize> = BTreeSet::new();
    let mut pending = joins;
    let mut ordered = Vec::new();
    while !pending.is_empty() {
        let before = pending.len();
        let mut deferred = Vec::new();
        for join in pending {
            if available.is_empty() {
                available.insert(join.left);
                available.insert(join.right);
                ordered.push(join);
                continue;
            }
            match (available.contains(&join.left), available.contains(&join.right)) {
                // already connected; whichever join came first wins
                (true, true) => {}
                (true, false) => {
                    available.insert(join.right);
                    ordered.push(join);
                }
                (false, true) => {
                    available.insert(join.left);
                    ordered.push(join.flipped());
                }
                (false, false) => deferred.push(join),
            }
        }
        if deferred.len() == before {
            return Err(PlanError::DisconnectedJoins {
                available: available.iter().map(label).collect(),
                remaining: deferred
                    .iter()
                    .flat_map(|j| [label(&j.left), label(&j.right)])
                    .collect(),
            });
        }
        pending = deferred;
    }
    Ok(ordered)
}

/// Whether `joins` link all `count` parents together.
pub fn is_connected(joins: &[NodeJoin], count: usize) -> bool {
    if count < 2 {
        return true;
    }
    let mut reached = BTreeSet::from([0]);
    loop {
        let before = reached.len();
        for join in joins {
            if reached.contains(&join.left) || reached.contains(&join.right) {
                reached.insert(join.left);
                reached.insert(join.right);
            }
        }
        if reached.len() == count {
            return true;
        }
        if reached.len() == before {
            return false;
        }
    }
}
