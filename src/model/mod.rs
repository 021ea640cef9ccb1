//! Semantic data model: concepts, grains, datasources and resolved plan units.
//!
//! ```text
//!   Concept ──lineage──▶ Function | WindowItem | FilterItem | AggregateWrapper | MultiSelect
//!      │
//!      └──grain──▶ Grain (set of key/property concepts)
//!
//!   Datasource ──columns──▶ ColumnAssignment ──▶ Concept
//!
//!   QueryDatasource ──datasources──▶ Source (Datasource | QueryDatasource)
//!        │
//!        ▼ [compiler]
//!   Cte ──joins──▶ Join ──▶ JoinKey
//! ```
//!
//! All types here are values. Changing one produces a new instance.

pub mod concept;
pub mod condition;
pub mod cte;
pub mod datasource;
pub mod function;
pub mod grain;
pub mod lineage;
pub mod query_datasource;
pub mod select;
pub mod types;

pub use concept::{unique_concepts, Concept, Metadata, DEFAULT_NAMESPACE};
pub use condition::{and_conditions, Comparison, Condition, Conditional, WhereClause};
pub use cte::{merge_ctes, Cte, Join, JoinKey, ProcessedQuery};
pub use datasource::{Address, ColumnAssignment, Datasource};
pub use function::{AggregateWrapper, CaseWhen, Expr, Function, Literal};
pub use grain::{concept_list_to_grain, Grain};
pub use lineage::{FilterItem, Lineage, OrderItem, WindowItem};
pub use query_datasource::{BaseJoin, QueryDatasource, Source, SourceMap};
pub use select::{
    AlignClause, AlignItem, ConceptTransform, MultiSelect, OrderBy, Select, SelectContent,
    SelectItem,
};
pub use types::{
    BooleanOperator, ComparisonOperator, ConceptSource, DataType, Derivation, FunctionType,
    JoinType, Modifier, Ordering, Purpose, SourceType, WindowType,
};
