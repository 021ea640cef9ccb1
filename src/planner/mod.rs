//! Strategy-node search - turns a concept request into a node tree.
//!
//! Two-phase architecture:
//! 1. Search: concepts → StrategyNode tree (select, group, window, filter, merge, multi-select)
//! 2. Resolution: StrategyNode → QueryDatasource (sources, joins, source map, grain)
//!
//! The compiler then lowers the resolved tree to CTEs.

mod generators;
pub mod history;
pub mod join_builder;
pub mod nodes;
pub mod search;

pub use history::History;
pub use join_builder::{get_node_joins, is_connected, resolve_join_order, NodeJoin};
pub use nodes::{NodeKind, StrategyNode};
pub use search::{search_concepts, ConceptPlanner, RowFilter};
