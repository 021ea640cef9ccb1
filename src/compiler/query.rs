//! Select statement compilation.

use std::collections::BTreeSet;

use super::ctes::datasource_to_ctes;
use crate::config::PlannerSettings;
use crate::environment::Environment;
use crate::error::{PlanError, PlanResult};
use crate::graph::ReferenceGraph;
use crate::model::{
    and_conditions, Derivation, Grain, ProcessedQuery, Purpose, QueryDatasource, Select, Source,
    SourceMap, SourceType,
};
use crate::planner::{ConceptPlanner, RowFilter};

/// Group `root` to the statement grain.
fn regroup(root: QueryDatasource, select: &Select, grain: &Grain) -> PlanResult<QueryDatasource> {
    let mut outputs = select.output_components();
    outputs.extend(select.hidden_components());
    let name = root.identifier();
    let inputs = root.output_concepts.clone();
    let provided: BTreeSet<String> = inputs.iter().map(|c| c.address()).collect();
    let source_map: SourceMap = inputs
        .iter()
        .chain(outputs.iter())
        .map(|c| {
            let address = c.address();
            let sources = if provided.contains(&address) {
                BTreeSet::from([name.clone()])
            } else {
                BTreeSet::new()
            };
            (address, sources)
        })
        .collect();
    QueryDatasource::new(
        inputs,
        outputs,
        source_map,
        vec![Source::from(root)],
        grain.clone(),
        Vec::new(),
        SourceType::Group,
    )
}

/// The where condition as a filter on the inputs of the selected aggregates.
///
/// Conditions on metrics or aggregates only apply after grouping.
fn row_filter(select: &Select) -> Option<RowFilter> {
    let where_clause = select.where_clause.as_ref()?;
    let row_level = where_clause
        .concept_arguments()
        .iter()
        .all(|c| c.purpose != Purpose::Metric && c.derivation() != Derivation::Aggregate);
    if !row_level {
        return None;
    }
    let mut selected = select.output_components();
    selected.extend(select.hidden_components());
    let aggregates: Vec<String> = selected
        .iter()
        .filter(|c| c.derivation() == Derivation::Aggregate)
        .map(|c| c.address())
        .collect();
    if aggregates.is_empty() {
        return None;
    }
    Some(RowFilter::new(where_clause.conditional.clone(), aggregates))
}

/// Plan and lower a select statement.
///
/// Outputs, hidden items and where-clause arguments are planned together.
/// A row-level where condition also filters the inputs of the selected
/// aggregates. When the plan comes back at a different grain than the
/// statement it is regrouped, and the where condition is applied to the
/// outermost CTE so rows are filtered before regrouping.
pub fn process_query(
    select: &Select,
    environment: &Environment,
    graph: &ReferenceGraph,
    settings: &PlannerSettings,
) -> PlanResult<ProcessedQuery> {
    let request = select.input_components();
    let node = ConceptPlanner::new(environment, graph)
        .with_settings(settings)
        .with_row_filter(row_filter(select))
        .search_concepts(&request, 0)?;
    let mut root = node.resolve()?;

    let grain = select.grain();
    if root.grain != grain {
        tracing::debug!(from = %root.grain, to = %grain, "Regrouping plan to statement grain");
        root = regroup(root, select, &grain)?;
    }
    let where_condition = select.where_clause.as_ref().map(|w| w.conditional.clone());
    let condition = and_conditions(root.condition.clone(), where_condition);
    let root = root.with_condition(condition).with_limit(select.limit);

    let ctes = datasource_to_ctes(&root, settings)?;
    let Some(base) = ctes.last().cloned() else {
        return Err(PlanError::NoDatasource {
            concepts: request.iter().map(|c| c.address()).collect(),
        });
    };
    tracing::info!(ctes = ctes.len(), base = %base.name, "Compiled select");

    Ok(ProcessedQuery {
        output_columns: select.output_components(),
        joins: base.joins.clone(),
        ctes,
        base,
        grain,
        limit: select.limit,
        where_clause: select.where_clause.clone(),
        order_by: select.order_by.clone(),
    })
}
