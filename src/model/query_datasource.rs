//! Resolved plan units.
//!
//! A [`QueryDatasource`] is what a strategy node resolves to: a set of
//! sources (physical datasources or nested query datasources), the joins
//! between them, and a source map recording which source provides each
//! concept.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::concept::{addresses, unique_concepts, Concept};
use super::condition::{and_conditions, Condition};
use super::datasource::Datasource;
use super::grain::Grain;
use super::types::{JoinType, Purpose, SourceType};
use crate::cache::fingerprint;
use crate::error::{PlanError, PlanResult};

/// Concept address -> names of the sources providing it.
///
/// Every entry holds at most one source. Concepts computed by the query
/// itself map to an empty set.
pub type SourceMap = BTreeMap<String, BTreeSet<String>>;

/// One input of a query datasource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Source {
    Datasource(Datasource),
    Query(Box<QueryDatasource>),
}

impl Source {
    pub fn name(&self) -> String {
        match self {
            Source::Datasource(datasource) => datasource.full_name(),
            Source::Query(query) => query.identifier(),
        }
    }

    pub fn output_concepts(&self) -> Vec<Concept> {
        match self {
            Source::Datasource(datasource) => datasource.concepts(),
            Source::Query(query) => query.output_concepts.clone(),
        }
    }

    pub fn grain(&self) -> &Grain {
        match self {
            Source::Datasource(datasource) => &datasource.grain,
            Source::Query(query) => &query.grain,
        }
    }

    pub fn provides(&self, address: &str) -> bool {
        match self {
            Source::Datasource(datasource) => datasource.provides(address),
            Source::Query(query) => query.output_concepts.iter().any(|c| c.address() == address),
        }
    }

    pub fn as_query(&self) -> Option<&QueryDatasource> {
        match self {
            Source::Query(query) => Some(query),
            Source::Datasource(_) => None,
        }
    }
}

impl From<Datasource> for Source {
    fn from(datasource: Datasource) -> Self {
        Source::Datasource(datasource)
    }
}

impl From<QueryDatasource> for Source {
    fn from(query: QueryDatasource) -> Self {
        Source::Query(Box::new(query))
    }
}

/// A validated join between two sources, referenced by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaseJoin {
    pub left: String,
    pub right: String,
    pub concepts: Vec<Concept>,
    pub join_type: JoinType,
}

impl BaseJoin {
    /// Validate a join.
    ///
    /// With `filter_to_mutual`, keys missing from either side are dropped;
    /// otherwise a missing key is an error. When no key survives, the join is
    /// only allowed (as a keyless join) if one side is entirely constant or
    /// entirely at abstract grain.
    pub fn new(
        left: &Source,
        right: &Source,
        concepts: Vec<Concept>,
        join_type: JoinType,
        filter_to_mutual: bool,
    ) -> PlanResult<Self> {
        let left_name = left.name();
        let right_name = right.name();
        if left_name == right_name {
            return Err(PlanError::SelfJoin(left_name));
        }

        let mut final_concepts = Vec::new();
        for concept in &concepts {
            let address = concept.address();
            let mut include = true;
            for (source, name) in [(left, &left_name), (right, &right_name)] {
                if source.provides(&address) {
                    continue;
                }
                if filter_to_mutual {
                    include = false;
                } else {
                    return Err(PlanError::MissingJoinKey {
                        concept: address,
                        datasource: name.clone(),
                        available: addresses(&source.output_concepts()),
                    });
                }
            }
            if include {
                final_concepts.push(concept.clone());
            }
        }

        if final_concepts.is_empty() && !concepts.is_empty() {
            let keyless = [left, right].iter().any(|source| {
                let outputs = source.output_concepts();
                outputs.iter().all(|c| c.purpose == Purpose::Constant)
                    || outputs.iter().all(|c| c.grain.is_abstract())
            });
            if !keyless {
                return Err(PlanError::NoMutualJoinKeys {
                    left: left_name,
                    right: right_name,
                    left_keys: addresses(&left.output_concepts()),
                    right_keys: addresses(&right.output_concepts()),
                    requested: addresses(&concepts),
                });
            }
        }

        Ok(Self {
            left: left_name,
            right: right_name,
            concepts: final_concepts,
            join_type,
        })
    }

    pub fn unique_id(&self) -> String {
        format!("{}{}{}", self.left, self.right, self.join_type.as_str())
    }
}

/// The resolved form of a strategy node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryDatasource {
    pub input_concepts: Vec<Concept>,
    pub output_concepts: Vec<Concept>,
    pub source_map: SourceMap,
    pub datasources: Vec<Source>,
    pub grain: Grain,
    pub joins: Vec<BaseJoin>,
    pub source_type: SourceType,
    pub partial_concepts: Vec<Concept>,
    pub condition: Option<Condition>,
    pub limit: Option<usize>,
}

impl QueryDatasource {
    /// Build and validate a query datasource.
    ///
    /// The source map must cover exactly the input and output concepts, and
    /// no entry may name more than one source.
    pub fn new(
        input_concepts: Vec<Concept>,
        output_concepts: Vec<Concept>,
        source_map: SourceMap,
        datasources: Vec<Source>,
        grain: Grain,
        joins: Vec<BaseJoin>,
        source_type: SourceType,
    ) -> PlanResult<Self> {
        let query = Self {
            input_concepts: unique_concepts(input_concepts),
            output_concepts: unique_concepts(output_concepts),
            source_map,
            datasources,
            grain,
            joins,
            source_type,
            partial_concepts: Vec::new(),
            condition: None,
            limit: None,
        };
        query.validate()?;
        Ok(query)
    }

    fn validate(&self) -> PlanResult<()> {
        for (concept, sources) in &self.source_map {
            if sources.len() > 1 {
                return Err(PlanError::AmbiguousSourceMap {
                    concept: concept.clone(),
                    count: sources.len(),
                });
            }
        }
        let expected: BTreeSet<String> = self
            .output_concepts
            .iter()
            .chain(self.input_concepts.iter())
            .map(|c| c.address())
            .collect();
        let seen: BTreeSet<String> = self.source_map.keys().cloned().collect();
        if seen != expected {
            return Err(PlanError::SourceMapMismatch {
                seen: seen.into_iter().collect(),
                expected: expected.into_iter().collect(),
            });
        }
        Ok(())
    }

    pub fn with_partial_concepts(mut self, partial_concepts: Vec<Concept>) -> Self {
        self.partial_concepts = unique_concepts(partial_concepts);
        self
    }

    pub fn with_condition(mut self, condition: Option<Condition>) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Deterministic name derived from sources, grain, source type and filter.
    pub fn identifier(&self) -> String {
        let base = if self.datasources.is_empty() {
            "constant".to_string()
        } else {
            self.datasources
                .iter()
                .map(|d| d.name())
                .collect::<Vec<_>>()
                .join("_join_")
        };
        let grain = if self.grain.is_abstract() {
            "_at_abstract".to_string()
        } else {
            format!("_at_{}", self.grain.identifier())
        };
        // nodes that reshape their parent rows never share a name with a plain select
        let shape = match self.source_type {
            SourceType::Group => "_grouped",
            SourceType::Window => "_windowed",
            SourceType::Filter => "_filtered",
            _ => "",
        };
        let filtered = match &self.condition {
            Some(condition) => format!("_filtered_by_{}", fingerprint(condition)),
            None => String::new(),
        };
        format!("{}{}{}{}", base, grain, shape, filtered)
    }

    pub fn name(&self) -> String {
        self.identifier()
    }

    /// Whether rendering needs a GROUP BY to reach the declared grain.
    pub fn group_required(&self) -> bool {
        match self.source_type {
            SourceType::Group | SourceType::Filter => true,
            SourceType::DirectSelect => {
                let merged: Grain = self.datasources.iter().map(|d| d.grain().clone()).sum();
                merged != self.grain
            }
            _ => false,
        }
    }

    pub fn non_partial_concept_addresses(&self) -> Vec<String> {
        let partial: BTreeSet<String> = self.partial_concepts.iter().map(|c| c.address()).collect();
        self.output_concepts
            .iter()
            .map(|c| c.address())
            .filter(|address| !partial.contains(address))
            .collect()
    }

    pub fn source_for(&self, address: &str) -> Option<&Source> {
        let name = self.source_map.get(address)?.iter().next()?;
        self.datasources.iter().find(|d| &d.name() == name)
    }

    /// Combine two query datasources of identical grain and source type.
    pub fn merge(&self, other: &QueryDatasource) -> PlanResult<QueryDatasource> {
        if self.grain != other.grain {
            return Err(PlanError::GrainMismatch {
                left: self.identifier(),
                right: other.identifier(),
                left_grain: self.grain.to_string(),
                right_grain: other.grain.to_string(),
            });
        }
        if self.source_type != other.source_type {
            return Err(PlanError::SourceTypeMismatch {
                left: self.identifier(),
                right: other.identifier(),
            });
        }

        let mut datasources: Vec<Source> = Vec::new();
        for source in self.datasources.iter().chain(other.datasources.iter()) {
            let name = source.name();
            match datasources.iter().position(|d| d.name() == name) {
                Some(index) => {
                    if let (Source::Query(existing), Source::Query(incoming)) =
                        (&datasources[index], source)
                    {
                        let merged = existing.merge(incoming)?;
                        datasources[index] = Source::Query(Box::new(merged));
                    }
                }
                None => datasources.push(source.clone()),
            }
        }

        let mut source_map = self.source_map.clone();
        for (concept, sources) in &other.source_map {
            let entry = source_map.entry(concept.clone()).or_default();
            if entry.is_empty() {
                *entry = sources.clone();
            }
        }

        let mut joins = self.joins.clone();
        for join in &other.joins {
            if !joins.iter().any(|j| j.unique_id() == join.unique_id()) {
                joins.push(join.clone());
            }
        }

        let full_self: BTreeSet<String> = self.non_partial_concept_addresses().into_iter().collect();
        let full_other: BTreeSet<String> = other.non_partial_concept_addresses().into_iter().collect();
        let partial_concepts = self
            .partial_concepts
            .iter()
            .filter(|c| !full_other.contains(&c.address()))
            .chain(
                other
                    .partial_concepts
                    .iter()
                    .filter(|c| !full_self.contains(&c.address())),
            )
            .cloned()
            .collect();

        let merged = QueryDatasource::new(
            self.input_concepts
                .iter()
                .chain(other.input_concepts.iter())
                .cloned()
                .collect(),
            self.output_concepts
                .iter()
                .chain(other.output_concepts.iter())
                .cloned()
                .collect(),
            source_map,
            datasources,
            self.grain.clone(),
            joins,
            self.source_type,
        )?
        .with_partial_concepts(partial_concepts)
        .with_condition(and_conditions(self.condition.clone(), other.condition.clone()))
        .with_limit(self.limit.or(other.limit));
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::datasource::ColumnAssignment;
    use crate::model::types::{DataType, Modifier};

    fn product_id() -> Concept {
        Concept::key("product_id", DataType::Integer)
    }

    fn products() -> Datasource {
        Datasource::table(
            "products",
            vec![
                ColumnAssignment::new("id", product_id()),
                ColumnAssignment::new(
                    "name",
                    Concept::property("product_name", DataType::String, vec![product_id()]),
                ),
            ],
        )
    }

    fn revenue() -> Datasource {
        Datasource::table(
            "revenue",
            vec![
                ColumnAssignment::new("product_id", product_id()),
                ColumnAssignment::new(
                    "amount",
                    Concept::property("amount", DataType::Float, vec![product_id()]),
                )
                .with_modifier(Modifier::Partial),
            ],
        )
    }

    fn select_from(datasource: Datasource, concepts: Vec<Concept>) -> QueryDatasource {
        let name = datasource.full_name();
        let source_map = concepts
            .iter()
            .map(|c| (c.address(), BTreeSet::from([name.clone()])))
            .collect();
        let grain = datasource.grain.clone();
        QueryDatasource::new(
            concepts.clone(),
            concepts,
            source_map,
            vec![Source::Datasource(datasource)],
            grain,
            vec![],
            SourceType::Select,
        )
        .unwrap()
    }

    #[test]
    fn test_source_map_must_cover_outputs() {
        let err = QueryDatasource::new(
            vec![product_id()],
            vec![product_id()],
            SourceMap::new(),
            vec![Source::Datasource(products())],
            Grain::new(vec![product_id()]),
            vec![],
            SourceType::Select,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::SourceMapMismatch { .. }));
    }

    #[test]
    fn test_source_map_entries_are_single() {
        let mut source_map = SourceMap::new();
        source_map.insert(
            "local.product_id".to_string(),
            BTreeSet::from(["products".to_string(), "revenue".to_string()]),
        );
        let err = QueryDatasource::new(
            vec![product_id()],
            vec![product_id()],
            source_map,
            vec![],
            Grain::default(),
            vec![],
            SourceType::Select,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::AmbiguousSourceMap { count: 2, .. }));
    }

    #[test]
    fn test_identifier() {
        let query = select_from(products(), vec![product_id()]);
        assert_eq!(query.identifier(), "products_at_product_id");
        let abstract_query = QueryDatasource::new(
            vec![],
            vec![],
            SourceMap::new(),
            vec![],
            Grain::default(),
            vec![],
            SourceType::Select,
        )
        .unwrap();
        assert_eq!(abstract_query.identifier(), "constant_at_abstract");
    }

    #[test]
    fn test_identifier_separates_source_types() {
        let mut grouped = select_from(revenue(), vec![product_id()]);
        grouped.source_type = SourceType::Group;
        let mut windowed = grouped.clone();
        windowed.source_type = SourceType::Window;
        assert_eq!(grouped.identifier(), "revenue_at_product_id_grouped");
        assert_eq!(windowed.identifier(), "revenue_at_product_id_windowed");
        assert!(matches!(
            grouped.merge(&windowed),
            Err(PlanError::SourceTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_merge_unions_outputs() {
        let name = Concept::property("product_name", DataType::String, vec![product_id()]);
        let left = select_from(products(), vec![product_id()]);
        let right = select_from(products(), vec![product_id(), name]);
        let merged = left.merge(&right).unwrap();
        assert_eq!(
            addresses(&merged.output_concepts),
            vec!["local.product_id", "local.product_name"]
        );
        assert_eq!(merged.datasources.len(), 1);
    }

    #[test]
    fn test_merge_rejects_grain_mismatch() {
        let left = select_from(products(), vec![product_id()]);
        let mut right = select_from(revenue(), vec![product_id()]);
        right.grain = Grain::default();
        assert!(matches!(
            left.merge(&right),
            Err(PlanError::GrainMismatch { .. })
        ));
    }

    #[test]
    fn test_base_join_validation() {
        let left = Source::Datasource(products());
        let right = Source::Datasource(revenue());
        let join = BaseJoin::new(&left, &right, vec![product_id()], JoinType::LeftOuter, false).unwrap();
        assert_eq!(join.unique_id(), "productsrevenueleft outer");

        let err = BaseJoin::new(&left, &left, vec![product_id()], JoinType::Inner, false).unwrap_err();
        assert!(matches!(err, PlanError::SelfJoin(_)));

        let name = Concept::property("product_name", DataType::String, vec![product_id()]);
        let err = BaseJoin::new(&left, &right, vec![name.clone()], JoinType::Inner, false).unwrap_err();
        assert!(matches!(err, PlanError::MissingJoinKey { .. }));

        let err = BaseJoin::new(&left, &right, vec![name], JoinType::Inner, true).unwrap_err();
        assert!(matches!(err, PlanError::NoMutualJoinKeys { .. }));
    }

    #[test]
    fn test_group_required() {
        let mut query = select_from(revenue(), vec![product_id()]);
        assert!(!query.group_required());
        query.source_type = SourceType::DirectSelect;
        assert!(!query.group_required());
        query.grain = Grain::default();
        assert!(query.group_required());
        query.source_type = SourceType::Group;
        assert!(query.group_required());
    }
}
