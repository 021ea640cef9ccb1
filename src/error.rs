//! Planning errors.
//!
//! Every failure the planner can surface to a query author lives here. All of
//! them are fatal for the current query; nothing in the crate retries.

use thiserror::Error;

use crate::graph::GraphError;

/// Errors raised while building the catalog, planning, or compiling a query.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Undefined concept: {address}.{}", format_suggestions(.suggestions))]
    UndefinedConcept {
        address: String,
        suggestions: Vec<String>,
    },

    #[error("Assignment to concept '{address}' is a duplicate declaration")]
    DuplicateConcept { address: String },

    #[error("No datasource exists for {}", join_addresses(.concepts))]
    NoDatasource { concepts: Vec<String> },

    #[error(
        "Ambiguous concept join resolution - possible paths = {}. Include an additional concept to disambiguate",
        format_candidates(.candidates)
    )]
    AmbiguousRelationship { candidates: Vec<Vec<String>> },

    #[error("Cannot join a datasource to itself, joining {0}")]
    SelfJoin(String),

    #[error("Invalid join, missing {concept} on {datasource}, have {available:?}")]
    MissingJoinKey {
        concept: String,
        datasource: String,
        available: Vec<String>,
    },

    #[error(
        "No mutual join keys found between {left} and {right}, left_keys {left_keys:?}, right_keys {right_keys:?}, provided join concepts {requested:?}"
    )]
    NoMutualJoinKeys {
        left: String,
        right: String,
        left_keys: Vec<String>,
        right_keys: Vec<String>,
        requested: Vec<String>,
    },

    #[error("Did not find any new joins, available {available:?} remaining is {remaining:?}")]
    DisconnectedJoins {
        available: Vec<String>,
        remaining: Vec<String>,
    },

    #[error("Can only merge {left} and {right} at identical grain, have {left_grain} and {right_grain}")]
    GrainMismatch {
        left: String,
        right: String,
        left_grain: String,
        right_grain: String,
    },

    #[error("Can only merge {left} and {right} with identical source type")]
    SourceTypeMismatch { left: String, right: String },

    #[error("Source map entry {concept} has multiple values ({count})")]
    AmbiguousSourceMap { concept: String, count: usize },

    #[error("Source map has mismatched values: seen {seen:?}, expected {expected:?}")]
    SourceMapMismatch {
        seen: Vec<String>,
        expected: Vec<String>,
    },

    #[error("Concept {concept} not found on {datasource}")]
    ConceptNotInSource { concept: String, datasource: String },

    #[error("Incorrect argument count to {function} function, expects {expected}, got {got}")]
    ArgumentCount {
        function: String,
        expected: String,
        got: usize,
    },

    #[error("Invalid input datatype {datatype} passed into {function} from {argument}")]
    InvalidArgumentType {
        function: String,
        argument: String,
        datatype: String,
    },

    #[error("Could not find any way to associate required concepts {}", join_addresses(.concepts))]
    Unresolvable { concepts: Vec<String> },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Failed to fingerprint value: {0}")]
    Hash(#[from] serde_json::Error),
}

/// Result type for planning operations.
pub type PlanResult<T> = Result<T, PlanError>;

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" Suggestions: {}", suggestions.join(", "))
    }
}

fn join_addresses(addresses: &[String]) -> String {
    addresses.join(", ")
}

fn format_candidates(candidates: &[Vec<String>]) -> String {
    candidates
        .iter()
        .map(|set| format!("{{{}}}", set.join(", ")))
        .collect::<Vec<_>>()
        .join(" | ")
}
