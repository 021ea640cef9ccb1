//! Per-run memo of search results.

use std::collections::{HashMap, HashSet};

use super::nodes::StrategyNode;
use crate::model::Concept;

/// Search results keyed by requested concepts, scoped to one planning run.
///
/// A key that is still being searched is "in flight"; searching it again
/// from deeper in the same recursion returns nothing instead of looping.
/// Every key in flight at that moment is marked incomplete, since its
/// outcome may differ once the cycle is no longer open.
#[derive(Debug, Default)]
pub struct History {
    history: HashMap<String, Option<StrategyNode>>,
    started: HashSet<String>,
    incomplete: HashSet<String>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted `address@grain` list plus the partial flag.
    pub fn search_key(concepts: &[Concept], accept_partial: bool) -> String {
        let mut parts: Vec<String> = concepts
            .iter()
            .map(|c| format!("{}@{}", c.address(), c.grain.identifier()))
            .collect();
        parts.sort();
        parts.dedup();
        format!("{}-{}", parts.join("-"), accept_partial)
    }

    pub fn get(&self, key: &str) -> Option<&Option<StrategyNode>> {
        self.history.get(key)
    }

    pub fn record(&mut self, key: String, result: Option<StrategyNode>) {
        self.history.insert(key, result);
    }

    /// Mark a key in flight. Returns false if it already was.
    pub fn start(&mut self, key: &str) -> bool {
        self.started.insert(key.to_string())
    }

    /// Record that a search hit a key already in flight.
    pub fn short_circuit(&mut self) {
        self.incomplete.extend(self.started.iter().cloned());
    }

    /// Clear the in-flight mark. Returns false if the search of `key`
    /// depended on a short-circuited key.
    pub fn finish(&mut self, key: &str) -> bool {
        self.started.remove(key);
        !self.incomplete.remove(key)
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.started.contains(key)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
