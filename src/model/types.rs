//! Enumerations shared across the data model.

use serde::Serialize;
use std::fmt;

/// Column and concept data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DataType {
    String,
    Bool,
    Map,
    List,
    Number,
    Float,
    Integer,
    Date,
    Datetime,
    Timestamp,
    Array,
    DatePart,
    /// Placeholder type of a forward reference that has not been bound yet.
    Unknown,
}

impl DataType {
    /// Parse a data type from a string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "string" => Some(DataType::String),
            "bool" => Some(DataType::Bool),
            "map" => Some(DataType::Map),
            "list" => Some(DataType::List),
            "number" => Some(DataType::Number),
            "float" => Some(DataType::Float),
            "int" | "integer" => Some(DataType::Integer),
            "date" => Some(DataType::Date),
            "datetime" => Some(DataType::Datetime),
            "timestamp" => Some(DataType::Timestamp),
            "array" => Some(DataType::Array),
            "date_part" => Some(DataType::DatePart),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Bool => "bool",
            DataType::Map => "map",
            DataType::List => "list",
            DataType::Number => "number",
            DataType::Float => "float",
            DataType::Integer => "int",
            DataType::Date => "date",
            DataType::Datetime => "datetime",
            DataType::Timestamp => "timestamp",
            DataType::Array => "array",
            DataType::DatePart => "date_part",
            DataType::Unknown => "unknown",
        }
    }

    /// Whether this type carries calendar date parts (month, year, ...).
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            DataType::Date | DataType::Datetime | DataType::Timestamp
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The semantic role of a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Purpose {
    Key,
    Property,
    Metric,
    Constant,
    /// Not yet decided; resolved from lineage or left on placeholders.
    Auto,
}

impl Purpose {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "key" => Some(Purpose::Key),
            "property" => Some(Purpose::Property),
            "metric" => Some(Purpose::Metric),
            "const" | "constant" => Some(Purpose::Constant),
            "auto" => Some(Purpose::Auto),
            _ => None,
        }
    }
}

/// How a concept is computed, derived from its lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Derivation {
    Basic,
    Window,
    Filter,
    Aggregate,
    Constant,
    MultiSelect,
}

/// Column modifiers on a datasource binding or select item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Modifier {
    /// The column does not cover every row at the datasource grain.
    Partial,
    Optional,
    Hidden,
}

/// Where a concept declaration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ConceptSource {
    #[default]
    Manual,
    AutoDerived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    Full,
    Cross,
}

impl JoinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "inner",
            JoinType::LeftOuter => "left outer",
            JoinType::RightOuter => "right outer",
            JoinType::Full => "full",
            JoinType::Cross => "cross",
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Ordering {
    Ascending,
    Descending,
}

/// The relational shape a resolved query datasource renders as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SourceType {
    Select,
    DirectSelect,
    Group,
    Window,
    Filter,
    Merge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WindowType {
    RowNumber,
    Rank,
    Lag,
    Lead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BooleanOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ComparisonOperator {
    Lt,
    Gt,
    Eq,
    Gte,
    Lte,
    Ne,
    In,
    Like,
    Is,
}

impl ComparisonOperator {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "<" => Some(ComparisonOperator::Lt),
            ">" => Some(ComparisonOperator::Gt),
            "=" => Some(ComparisonOperator::Eq),
            ">=" => Some(ComparisonOperator::Gte),
            "<=" => Some(ComparisonOperator::Lte),
            "!=" | "<>" => Some(ComparisonOperator::Ne),
            "in" => Some(ComparisonOperator::In),
            "like" => Some(ComparisonOperator::Like),
            "is" => Some(ComparisonOperator::Is),
            _ => None,
        }
    }
}

/// Every function operator the model understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FunctionType {
    // Generic
    Cast,
    Concat,
    Coalesce,
    Constant,
    Case,

    // Math
    Add,
    Subtract,
    Multiply,
    Divide,
    Round,

    // Aggregates
    Count,
    CountDistinct,
    Sum,
    Max,
    Min,
    Avg,

    // String
    Length,
    Like,
    Ilike,
    Lower,
    Upper,

    // Dates
    Date,
    Datetime,
    Timestamp,
    Second,
    Minute,
    Hour,
    Day,
    DayOfWeek,
    Week,
    Month,
    Quarter,
    Year,
}

impl FunctionType {
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            FunctionType::Count
                | FunctionType::CountDistinct
                | FunctionType::Sum
                | FunctionType::Max
                | FunctionType::Min
                | FunctionType::Avg
        )
    }

    /// Lowercase name used for derived concept suffixes and messages.
    pub fn name(&self) -> &'static str {
        match self {
            FunctionType::Cast => "cast",
            FunctionType::Concat => "concat",
            FunctionType::Coalesce => "coalesce",
            FunctionType::Constant => "constant",
            FunctionType::Case => "case",
            FunctionType::Add => "add",
            FunctionType::Subtract => "subtract",
            FunctionType::Multiply => "multiply",
            FunctionType::Divide => "divide",
            FunctionType::Round => "round",
            FunctionType::Count => "count",
            FunctionType::CountDistinct => "count_distinct",
            FunctionType::Sum => "sum",
            FunctionType::Max => "max",
            FunctionType::Min => "min",
            FunctionType::Avg => "avg",
            FunctionType::Length => "len",
            FunctionType::Like => "like",
            FunctionType::Ilike => "ilike",
            FunctionType::Lower => "lower",
            FunctionType::Upper => "upper",
            FunctionType::Date => "date",
            FunctionType::Datetime => "datetime",
            FunctionType::Timestamp => "timestamp",
            FunctionType::Second => "second",
            FunctionType::Minute => "minute",
            FunctionType::Hour => "hour",
            FunctionType::Day => "day",
            FunctionType::DayOfWeek => "day_of_week",
            FunctionType::Week => "week",
            FunctionType::Month => "month",
            FunctionType::Quarter => "quarter",
            FunctionType::Year => "year",
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
