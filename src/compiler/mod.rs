//! Lowering of resolved plans to render-ready CTEs.
//!
//! ```text
//! Select ──search──▶ StrategyNode ──resolve──▶ QueryDatasource ──lower──▶ [Cte] ──▶ ProcessedQuery
//! ```
//!
//! A nested query datasource becomes a parent CTE before the CTE that reads
//! it, so the CTE list is in render order and the root comes last. CTE names
//! are derived from query identifiers, so equivalent subplans collapse into
//! one CTE.

mod ctes;
mod query;

pub use ctes::{cte_name, datasource_to_ctes, datasource_to_query_datasource};
pub use query::process_query;
