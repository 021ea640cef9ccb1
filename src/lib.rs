//! # Grainline
//!
//! A semantic query compiler: turns requests for named concepts into a
//! chain of SQL-ready CTEs.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        Concepts + Datasources (Semantic Catalog)        │
//! │      (keys, properties, metrics, derived lineage)       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [environment builder]
//! ┌─────────────────────────────────────────────────────────┐
//! │           Environment (immutable snapshot)              │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [graph builder]
//! ┌─────────────────────────────────────────────────────────┐
//! │      ReferenceGraph (concept ↔ datasource paths)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [planner]
//! ┌─────────────────────────────────────────────────────────┐
//! │     StrategyNode tree  ──resolve──▶  QueryDatasource    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [compiler]
//! ┌─────────────────────────────────────────────────────────┐
//! │             ProcessedQuery (ordered CTEs)               │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Parsing source text and rendering SQL are left to callers.

pub mod cache;
pub mod compiler;
pub mod config;
pub mod environment;
pub mod error;
pub mod graph;
pub mod model;
pub mod planner;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::compiler::{datasource_to_ctes, process_query};
    pub use crate::config::PlannerSettings;
    pub use crate::environment::{Environment, EnvironmentBuilder};
    pub use crate::error::{PlanError, PlanResult};
    pub use crate::graph::ReferenceGraph;
    pub use crate::model::{
        AggregateWrapper, ColumnAssignment, Concept, Condition, DataType, Datasource, Expr,
        FilterItem, Function, FunctionType, Grain, JoinType, Lineage, Modifier, MultiSelect,
        ProcessedQuery, Purpose, QueryDatasource, Select, WhereClause, WindowItem,
    };
    pub use crate::planner::{search_concepts, ConceptPlanner, StrategyNode};
}

pub use error::{PlanError, PlanResult};
