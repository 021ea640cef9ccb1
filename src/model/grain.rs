//! Grains: the set of concepts that uniquely identifies a row.
//!
//! ```text
//!   components ──normalize──▶ default grains ──canonicalize──▶ Grain
//!                                               │
//!                      keys kept ◀──────────────┤
//!   properties not owned by a kept key ◀────────┤
//!                        metrics kept ◀─────────┤
//!                     constants dropped ◀───────┘
//! ```

use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

use super::concept::Concept;
use super::types::Purpose;

/// An ordered, address-deduplicated set of concepts.
///
/// Equality ignores order and compares address sets. An empty grain is
/// "abstract": a single aggregate row.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Grain {
    components: Vec<Concept>,
    /// Set on the self-grain of a key, which is not canonicalized.
    nested: bool,
}

impl Grain {
    /// Build a canonical grain from arbitrary concepts.
    pub fn new<I>(components: I) -> Self
    where
        I: IntoIterator<Item = Concept>,
    {
        let mut seen = HashSet::new();
        let normalized: Vec<Concept> = components
            .into_iter()
            .filter(|c| seen.insert(c.address()))
            .map(|c| c.with_default_grain())
            .collect();
        Self {
            components: canonicalize(normalized),
            nested: false,
        }
    }

    /// Build a grain without canonicalization.
    pub fn nested<I>(components: I) -> Self
    where
        I: IntoIterator<Item = Concept>,
    {
        let mut seen = HashSet::new();
        Self {
            components: components
                .into_iter()
                .filter(|c| seen.insert(c.address()))
                .collect(),
            nested: true,
        }
    }

    pub fn components(&self) -> &[Concept] {
        &self.components
    }

    pub fn is_nested(&self) -> bool {
        self.nested
    }

    pub fn addresses(&self) -> BTreeSet<String> {
        self.components.iter().map(|c| c.address()).collect()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.components.iter().any(|c| c.address() == address)
    }

    pub fn is_abstract(&self) -> bool {
        self.components.is_empty()
    }

    pub fn is_subset(&self, other: &Grain) -> bool {
        self.addresses().is_subset(&other.addresses())
    }

    pub fn is_disjoint(&self, other: &Grain) -> bool {
        self.addresses().is_disjoint(&other.addresses())
    }

    pub fn intersection(&self, other: &Grain) -> Grain {
        let shared = other.addresses();
        Grain::new(
            self.components
                .iter()
                .filter(|c| shared.contains(&c.address()))
                .cloned(),
        )
    }

    pub fn with_namespace(&self, namespace: &str) -> Grain {
        Self {
            components: self
                .components
                .iter()
                .map(|c| c.with_namespace(namespace))
                .collect(),
            nested: self.nested,
        }
    }

    pub(crate) fn has_placeholders(&self) -> bool {
        self.components.iter().any(|c| c.is_placeholder())
    }

    /// Stable textual form used in identifiers: sorted safe addresses.
    pub fn identifier(&self) -> String {
        if self.is_abstract() {
            return "abstract".to_string();
        }
        let mut parts: Vec<String> = self.components.iter().map(|c| c.safe_address()).collect();
        parts.sort();
        parts.join("_")
    }
}

fn canonicalize(components: Vec<Concept>) -> Vec<Concept> {
    let key_addresses: BTreeSet<String> = components
        .iter()
        .filter(|c| c.purpose == Purpose::Key)
        .map(|c| c.address())
        .collect();
    components
        .into_iter()
        .filter(|c| match c.purpose {
            Purpose::Key | Purpose::Metric | Purpose::Auto => true,
            Purpose::Constant => false,
            Purpose::Property => {
                let owners = c.grain.addresses();
                owners.is_empty() || !owners.is_subset(&key_addresses)
            }
        })
        .collect()
}

impl PartialEq for Grain {
    fn eq(&self, other: &Self) -> bool {
        self.addresses() == other.addresses()
    }
}

impl Add for Grain {
    type Output = Grain;

    fn add(self, other: Grain) -> Grain {
        &self + &other
    }
}

impl<'a> Add<&'a Grain> for &'a Grain {
    type Output = Grain;

    fn add(self, other: &'a Grain) -> Grain {
        Grain::new(
            self.components
                .iter()
                .chain(other.components.iter())
                .cloned(),
        )
    }
}

impl Sum for Grain {
    fn sum<I: Iterator<Item = Grain>>(iter: I) -> Grain {
        iter.fold(Grain::default(), |acc, g| acc + g)
    }
}

impl fmt::Display for Grain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_abstract() {
            return f.write_str("Grain<Abstract>");
        }
        let parts: Vec<String> = self.components.iter().map(|c| c.address()).collect();
        write!(f, "Grain<{}>", parts.join(","))
    }
}

/// Grain implied by a list of selected concepts. Metrics never contribute.
pub fn concept_list_to_grain(concepts: &[Concept]) -> Grain {
    Grain::new(
        concepts
            .iter()
            .filter(|c| c.purpose != Purpose::Metric)
            .cloned(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::DataType;

    fn order_id() -> Concept {
        Concept::key("order_id", DataType::Integer)
    }

    fn customer_id() -> Concept {
        Concept::key("customer_id", DataType::Integer)
    }

    #[test]
    fn test_property_folded_into_owning_key() {
        let order_total = Concept::property("order_total", DataType::Float, vec![order_id()]);
        let grain = Grain::new(vec![order_id(), order_total]);
        assert_eq!(grain.addresses().len(), 1);
        assert!(grain.contains("local.order_id"));
    }

    #[test]
    fn test_property_without_key_kept() {
        let order_total = Concept::property("order_total", DataType::Float, vec![order_id()]);
        let grain = Grain::new(vec![customer_id(), order_total]);
        assert!(grain.contains("local.order_total"));
        assert!(grain.contains("local.customer_id"));
    }

    #[test]
    fn test_constants_dropped() {
        let one = Concept::new("one", DataType::Integer, Purpose::Constant);
        let grain = Grain::new(vec![order_id(), one]);
        assert_eq!(grain.addresses().len(), 1);
    }

    #[test]
    fn test_addition_commutative_and_idempotent() {
        let a = Grain::new(vec![order_id()]);
        let b = Grain::new(vec![customer_id()]);
        assert_eq!(&a + &b, &b + &a);
        assert_eq!(&a + &a, a);
        assert_eq!(&(&a + &b) + &b, &a + &b);
    }

    #[test]
    fn test_equality_ignores_order() {
        let a = Grain::new(vec![order_id(), customer_id()]);
        let b = Grain::new(vec![customer_id(), order_id()]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_subset_and_intersection() {
        let small = Grain::new(vec![order_id()]);
        let large = Grain::new(vec![order_id(), customer_id()]);
        assert!(small.is_subset(&large));
        assert!(!large.is_subset(&small));
        assert_eq!(large.intersection(&small), small);
        assert!(Grain::default().is_subset(&small));
    }

    #[test]
    fn test_metrics_excluded_from_concept_list_grain() {
        let revenue = Concept::metric("revenue", DataType::Float);
        let grain = concept_list_to_grain(&[order_id(), revenue]);
        assert_eq!(grain, Grain::new(vec![order_id()]));
    }

    #[test]
    fn test_display() {
        assert_eq!(Grain::default().to_string(), "Grain<Abstract>");
        assert_eq!(
            Grain::new(vec![order_id()]).to_string(),
            "Grain<local.order_id>"
        );
    }
}
