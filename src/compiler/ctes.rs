//! Query datasource to CTE lowering.

use std::collections::{BTreeMap, BTreeSet};

use crate::cache::fingerprint;
use crate::config::PlannerSettings;
use crate::error::PlanResult;
use crate::model::{
    merge_ctes, Cte, Datasource, Join, JoinKey, QueryDatasource, Source, SourceMap, SourceType,
};

/// `cte_<identifier>_<hash>`, with the identifier cut to fit `max_length`.
///
/// The hash covers the full identifier, so truncation never merges two
/// different plans.
pub fn cte_name(query: &QueryDatasource, max_length: usize) -> String {
    let identifier = query.identifier();
    let hash = fingerprint(&identifier);
    let budget = max_length.saturating_sub(hash.len() + 1);
    let base: String = format!("cte_{}", identifier)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(budget)
        .collect();
    format!("{}_{}", base, hash)
}

/// A physical datasource as a direct select of all its columns.
pub fn datasource_to_query_datasource(datasource: &Datasource) -> PlanResult<QueryDatasource> {
    let concepts = datasource.concepts();
    let name = datasource.full_name();
    let source_map: SourceMap = concepts
        .iter()
        .map(|c| (c.address(), BTreeSet::from([name.clone()])))
        .collect();
    QueryDatasource::new(
        concepts.clone(),
        concepts,
        source_map,
        vec![Source::Datasource(datasource.clone())],
        datasource.grain.clone(),
        Vec::new(),
        SourceType::DirectSelect,
    )
}

/// Resolve every source map entry to a single name. Computed concepts map
/// to the empty string.
fn flatten_source_map(source_map: &SourceMap, rename: impl Fn(&str) -> Option<String>) -> BTreeMap<String, String> {
    source_map
        .iter()
        .map(|(address, sources)| {
            let name = sources
                .iter()
                .next()
                .and_then(|source| rename(source))
                .unwrap_or_default();
            (address.clone(), name)
        })
        .collect()
}

/// Lower `query` and its sources to CTEs, parents first.
///
/// Queries with one physical datasource read it directly. Anything else
/// reads parent CTEs, including physical datasources, which get wrapped in
/// a CTE of their own.
pub fn datasource_to_ctes(query: &QueryDatasource, settings: &PlannerSettings) -> PlanResult<Vec<Cte>> {
    let wraps_sources = query.datasources.len() > 1
        || query
            .datasources
            .iter()
            .any(|source| matches!(source, Source::Query(_)));

    let mut ctes: Vec<Cte> = Vec::new();
    let mut parent_ctes: Vec<String> = Vec::new();
    let mut parent_names: BTreeMap<String, String> = BTreeMap::new();
    let source_map = if wraps_sources {
        for source in &query.datasources {
            let sub_query = match source {
                Source::Query(sub_query) => (**sub_query).clone(),
                Source::Datasource(datasource) => datasource_to_query_datasource(datasource)?,
            };
            let sub_ctes = datasource_to_ctes(&sub_query, settings)?;
            if let Some(last) = sub_ctes.last() {
                parent_names.insert(source.name(), last.name.clone());
                parent_ctes.push(last.name.clone());
            }
            ctes.extend(sub_ctes);
        }
        flatten_source_map(&query.source_map, |name| parent_names.get(name).cloned())
    } else {
        flatten_source_map(&query.source_map, |name| Some(name.to_string()))
    };

    let cte_for = |name: &str| {
        parent_names
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    };
    let joins = query
        .joins
        .iter()
        .map(|join| Join {
            left_cte: cte_for(&join.left),
            right_cte: cte_for(&join.right),
            join_type: join.join_type,
            joinkeys: join
                .concepts
                .iter()
                .map(|concept| JoinKey {
                    concept: concept.clone(),
                })
                .collect(),
        })
        .collect();

    let cte = Cte {
        name: cte_name(query, settings.naming.max_cte_name_length),
        source: query.clone(),
        output_columns: query.output_concepts.clone(),
        source_map,
        grain: query.grain.clone(),
        group_to_grain: query.group_required(),
        parent_ctes,
        joins,
        condition: query.condition.clone(),
        partial_concepts: query.partial_concepts.clone(),
    };
    tracing::debug!(
        cte = %cte.name,
        parents = cte.parent_ctes.len(),
        group = cte.group_to_grain,
        "Lowered query datasource"
    );
    ctes.push(cte);
    merge_ctes(ctes)
}
