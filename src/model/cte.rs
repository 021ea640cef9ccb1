//! Render-ready common table expressions.

use serde::Serialize;
use std::collections::BTreeMap;

use super::concept::{unique_concepts, Concept};
use super::condition::{Condition, WhereClause};
use super::grain::Grain;
use super::query_datasource::{QueryDatasource, Source};
use super::select::OrderBy;
use super::types::{JoinType, Purpose};
use crate::error::{PlanError, PlanResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinKey {
    pub concept: Concept,
}

/// A join between two CTEs, by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Join {
    pub left_cte: String,
    pub right_cte: String,
    pub join_type: JoinType,
    pub joinkeys: Vec<JoinKey>,
}

impl Join {
    pub fn unique_id(&self) -> String {
        format!("{}{}{}", self.left_cte, self.right_cte, self.join_type.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cte {
    pub name: String,
    pub source: QueryDatasource,
    pub output_columns: Vec<Concept>,
    /// Concept address -> parent CTE or datasource it is read from.
    /// Empty for concepts computed in this CTE.
    pub source_map: BTreeMap<String, String>,
    pub grain: Grain,
    pub group_to_grain: bool,
    /// Names of CTEs that must be rendered before this one.
    pub parent_ctes: Vec<String>,
    pub joins: Vec<Join>,
    pub condition: Option<Condition>,
    pub partial_concepts: Vec<Concept>,
}

impl Cte {
    /// Union another CTE of the same grain into this one.
    pub fn merge(&mut self, other: &Cte) -> PlanResult<()> {
        if self.grain != other.grain {
            return Err(PlanError::GrainMismatch {
                left: self.name.clone(),
                right: other.name.clone(),
                left_grain: self.grain.to_string(),
                right_grain: other.grain.to_string(),
            });
        }
        tracing::debug!(cte = %self.name, "Merging two copies of CTE");

        self.partial_concepts = unique_concepts(
            self.partial_concepts
                .iter()
                .chain(other.partial_concepts.iter())
                .cloned(),
        );
        for parent in &other.parent_ctes {
            if !self.parent_ctes.contains(parent) {
                self.parent_ctes.push(parent.clone());
            }
        }
        for (address, source) in &other.source_map {
            self.source_map
                .entry(address.clone())
                .or_insert_with(|| source.clone());
        }
        self.output_columns = unique_concepts(
            self.output_columns
                .iter()
                .chain(other.output_columns.iter())
                .cloned(),
        );
        for join in &other.joins {
            if !self.joins.iter().any(|j| j.unique_id() == join.unique_id()) {
                self.joins.push(join.clone());
            }
        }
        for (address, sources) in &other.source.source_map {
            self.source
                .source_map
                .entry(address.clone())
                .or_insert_with(|| sources.clone());
        }
        self.source.output_concepts = unique_concepts(
            self.source
                .output_concepts
                .iter()
                .chain(other.source.output_concepts.iter())
                .cloned(),
        );
        Ok(())
    }

    fn single_physical_source(&self) -> Option<&super::datasource::Datasource> {
        match self.source.datasources.as_slice() {
            [Source::Datasource(datasource)] => Some(datasource),
            _ => None,
        }
    }

    /// What the FROM clause reads: the physical table when there is exactly
    /// one, otherwise the left side of the first join or the first parent.
    pub fn base_name(&self) -> String {
        if let Some(datasource) = self.single_physical_source() {
            return datasource.safe_location();
        }
        if let Some(join) = self.joins.first() {
            return join.left_cte.clone();
        }
        if let Some(parent) = self.parent_ctes.first() {
            return parent.clone();
        }
        self.source.name()
    }

    pub fn base_alias(&self) -> String {
        if let Some(datasource) = self.single_physical_source() {
            return datasource.full_name().replace('.', "_");
        }
        if let Some(join) = self.joins.first() {
            return join.left_cte.clone();
        }
        if let Some(parent) = self.parent_ctes.first() {
            return parent.clone();
        }
        self.name.clone()
    }

    /// Constant-only CTEs without parents render without a FROM clause.
    pub fn render_from_clause(&self) -> bool {
        !(self
            .output_columns
            .iter()
            .all(|c| c.purpose == Purpose::Constant)
            && self.parent_ctes.is_empty()
            && !self.group_to_grain)
    }

    /// Output columns read from a parent or datasource rather than computed here.
    pub fn sourced_concepts(&self) -> Vec<Concept> {
        self.output_columns
            .iter()
            .filter(|c| {
                self.source_map
                    .get(&c.address())
                    .is_some_and(|source| !source.is_empty())
            })
            .cloned()
            .collect()
    }
}

/// Deduplicate CTEs by name, merging duplicates into the first occurrence.
pub fn merge_ctes(ctes: Vec<Cte>) -> PlanResult<Vec<Cte>> {
    let mut output: Vec<Cte> = Vec::new();
    for cte in ctes {
        match output.iter_mut().find(|existing| existing.name == cte.name) {
            Some(existing) => existing.merge(&cte)?,
            None => output.push(cte),
        }
    }
    Ok(output)
}

/// Everything a dialect renderer needs to emit one statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedQuery {
    pub output_columns: Vec<Concept>,
    /// Topologically ordered; the root CTE is last.
    pub ctes: Vec<Cte>,
    pub base: Cte,
    pub joins: Vec<Join>,
    pub grain: Grain,
    pub limit: Option<usize>,
    pub where_clause: Option<WhereClause>,
    pub order_by: Option<OrderBy>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::datasource::{ColumnAssignment, Datasource};
    use crate::model::query_datasource::SourceMap;
    use crate::model::types::{DataType, SourceType};
    use std::collections::BTreeSet;

    fn product_id() -> Concept {
        Concept::key("product_id", DataType::Integer)
    }

    fn cte(name: &str, columns: Vec<Concept>) -> Cte {
        let datasource = Datasource::table(
            "products",
            columns
                .iter()
                .map(|c| ColumnAssignment::new(c.name.clone(), c.clone()))
                .collect(),
        );
        let source_map: SourceMap = columns
            .iter()
            .map(|c| (c.address(), BTreeSet::from(["products".to_string()])))
            .collect();
        let source = QueryDatasource::new(
            columns.clone(),
            columns.clone(),
            source_map,
            vec![Source::Datasource(datasource)],
            Grain::new(vec![product_id()]),
            vec![],
            SourceType::Select,
        )
        .unwrap();
        Cte {
            name: name.to_string(),
            source,
            output_columns: columns.clone(),
            source_map: columns
                .iter()
                .map(|c| (c.address(), "products".to_string()))
                .collect(),
            grain: Grain::new(vec![product_id()]),
            group_to_grain: false,
            parent_ctes: vec![],
            joins: vec![],
            condition: None,
            partial_concepts: vec![],
        }
    }

    #[test]
    fn test_base_name_for_single_table() {
        let cte = cte("cte_products", vec![product_id()]);
        assert_eq!(cte.base_name(), "products");
        assert_eq!(cte.base_alias(), "products");
        assert!(cte.render_from_clause());
    }

    #[test]
    fn test_merge_ctes_by_name() {
        let name = Concept::property("product_name", DataType::String, vec![product_id()]);
        let merged = merge_ctes(vec![
            cte("cte_products", vec![product_id()]),
            cte("cte_products", vec![product_id(), name]),
            cte("cte_other", vec![product_id()]),
        ])
        .unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].output_columns.len(), 2);
        assert_eq!(merged[0].source.output_concepts.len(), 2);
        assert_eq!(merged[1].name, "cte_other");
    }

    #[test]
    fn test_merge_rejects_grain_mismatch() {
        let mut left = cte("cte_products", vec![product_id()]);
        let mut right = cte("cte_products", vec![product_id()]);
        right.grain = Grain::default();
        assert!(left.merge(&right).is_err());
    }
}
