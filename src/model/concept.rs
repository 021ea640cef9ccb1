//! Concepts: named, typed, purpose-tagged semantic columns.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use super::grain::Grain;
use super::lineage::Lineage;
use super::types::{ConceptSource, DataType, Derivation, Purpose};
use crate::error::PlanResult;

/// Namespace assigned to concepts declared without one.
pub const DEFAULT_NAMESPACE: &str = "local";

/// Descriptive metadata attached to a concept declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    pub description: Option<String>,
    pub line_number: Option<usize>,
    pub concept_source: ConceptSource,
}

impl Metadata {
    pub fn auto_derived(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            line_number: None,
            concept_source: ConceptSource::AutoDerived,
        }
    }
}

/// A semantic column.
///
/// Concepts are values: every change produces a new instance through one of
/// the `with_*` methods. Two concepts are equal when their name, datatype,
/// purpose, namespace and grain (as an address set) agree.
#[derive(Debug, Clone, Serialize)]
pub struct Concept {
    pub name: String,
    pub datatype: DataType,
    pub purpose: Purpose,
    pub metadata: Metadata,
    pub lineage: Option<Box<Lineage>>,
    pub namespace: String,
    /// Concepts this property is owned by.
    pub keys: Vec<Concept>,
    pub grain: Grain,
}

impl Concept {
    /// Create a concept in the default namespace at its default grain.
    pub fn new(name: impl Into<String>, datatype: DataType, purpose: Purpose) -> Self {
        let mut concept = Self {
            name: name.into(),
            datatype,
            purpose,
            metadata: Metadata::default(),
            lineage: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            keys: Vec::new(),
            grain: Grain::default(),
        };
        concept.grain = concept.default_grain();
        concept
    }

    pub fn key(name: impl Into<String>, datatype: DataType) -> Self {
        Self::new(name, datatype, Purpose::Key)
    }

    pub fn property(name: impl Into<String>, datatype: DataType, keys: Vec<Concept>) -> Self {
        Self::new(name, datatype, Purpose::Property).with_keys(keys)
    }

    pub fn metric(name: impl Into<String>, datatype: DataType) -> Self {
        Self::new(name, datatype, Purpose::Metric)
    }

    /// Create a concept computed from `lineage`.
    ///
    /// The datatype comes from the lineage output. `Purpose::Auto` is resolved
    /// from the lineage as well.
    pub fn derived(name: impl Into<String>, purpose: Purpose, lineage: Lineage) -> Self {
        let purpose = match purpose {
            Purpose::Auto => lineage.output_purpose(),
            other => other,
        };
        let keys = match (&lineage, purpose) {
            (Lineage::Window(window), Purpose::Property) => vec![window.content.clone()],
            _ => Vec::new(),
        };
        let mut concept = Self {
            name: name.into(),
            datatype: lineage.output_datatype(),
            purpose,
            metadata: Metadata::default(),
            lineage: Some(Box::new(lineage)),
            namespace: DEFAULT_NAMESPACE.to_string(),
            keys,
            grain: Grain::default(),
        };
        concept.grain = concept.declared_grain();
        concept
    }

    /// Placeholder for a reference that has not been declared yet.
    pub fn placeholder(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datatype: DataType::Unknown,
            purpose: Purpose::Auto,
            metadata: Metadata::default(),
            lineage: None,
            namespace: namespace.into(),
            keys: Vec::new(),
            grain: Grain::default(),
        }
    }

    /// Globally unique key: `namespace.name`.
    pub fn address(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Identifier-safe rendering of the address.
    pub fn safe_address(&self) -> String {
        if self.namespace == DEFAULT_NAMESPACE || self.namespace.is_empty() {
            self.name.replace('.', "_")
        } else {
            format!(
                "{}_{}",
                self.namespace.replace('.', "_"),
                self.name.replace('.', "_")
            )
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.datatype == DataType::Unknown && self.purpose == Purpose::Auto && self.lineage.is_none()
    }

    /// Whether any placeholder is reachable through lineage, keys or grain.
    pub fn has_placeholders(&self) -> bool {
        self.is_placeholder()
            || self.keys.iter().any(|key| key.has_placeholders())
            || self.grain.has_placeholders()
            || self
                .concept_arguments()
                .iter()
                .any(|argument| argument.has_placeholders())
    }

    /// A concept with no lineage, sourced straight from datasource columns.
    pub fn is_root(&self) -> bool {
        self.lineage.is_none()
    }

    pub fn derivation(&self) -> Derivation {
        match self.lineage.as_deref() {
            Some(Lineage::Window(_)) => Derivation::Window,
            Some(Lineage::Filter(_)) => Derivation::Filter,
            Some(Lineage::Aggregate(_)) => Derivation::Aggregate,
            Some(Lineage::MultiSelect(_)) => Derivation::MultiSelect,
            Some(Lineage::Function(function)) if function.operator.is_aggregate() => {
                Derivation::Aggregate
            }
            _ if self.purpose == Purpose::Constant => Derivation::Constant,
            _ => Derivation::Basic,
        }
    }

    /// Concepts referenced directly by the lineage.
    pub fn concept_arguments(&self) -> Vec<Concept> {
        self.lineage
            .as_ref()
            .map(|lineage| lineage.concept_arguments())
            .unwrap_or_default()
    }

    /// Every concept this one is transitively derived from.
    pub fn sources(&self) -> Vec<Concept> {
        let mut output = Vec::new();
        for argument in self.concept_arguments() {
            let nested = argument.sources();
            output.push(argument);
            output.extend(nested);
        }
        output
    }

    pub fn with_namespace(&self, namespace: &str) -> Self {
        Self {
            name: self.name.clone(),
            datatype: self.datatype,
            purpose: self.purpose,
            metadata: self.metadata.clone(),
            lineage: self
                .lineage
                .as_ref()
                .map(|lineage| Box::new(lineage.with_namespace(namespace))),
            namespace: namespace.to_string(),
            keys: self.keys.clone(),
            grain: self.grain.with_namespace(namespace),
        }
    }

    pub fn with_grain(&self, grain: Grain) -> Self {
        let mut concept = self.clone();
        concept.grain = grain;
        concept
    }

    pub fn with_default_grain(&self) -> Self {
        self.with_grain(self.default_grain())
    }

    pub fn with_keys(mut self, keys: Vec<Concept>) -> Self {
        self.keys = keys;
        self.grain = self.declared_grain();
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    pub fn in_namespace(self, namespace: &str) -> Self {
        self.with_namespace(namespace)
    }

    /// The grain this concept naturally lives at.
    ///
    /// A key is its own grain, a property is owned by its keys (or by the
    /// grains of its arguments when derived), and a metric is abstract unless
    /// it aggregates `by` explicit concepts.
    pub fn default_grain(&self) -> Grain {
        match self.purpose {
            Purpose::Key => Grain::nested(vec![self.with_grain(Grain::default())]),
            Purpose::Property => {
                if !self.keys.is_empty() {
                    Grain::new(self.keys.clone())
                } else {
                    let components: Vec<Concept> = self
                        .concept_arguments()
                        .iter()
                        .flat_map(|argument| argument.default_grain().components().to_vec())
                        .collect();
                    Grain::new(components)
                }
            }
            Purpose::Metric => match self.lineage.as_deref() {
                Some(Lineage::Aggregate(wrapper)) if !wrapper.by.is_empty() => {
                    Grain::new(wrapper.by.clone())
                }
                _ => Grain::default(),
            },
            Purpose::Constant | Purpose::Auto => self.grain.clone(),
        }
    }

    fn declared_grain(&self) -> Grain {
        match self.purpose {
            Purpose::Constant => Grain::default(),
            _ => self.default_grain(),
        }
    }

    /// Replace placeholder references with their declared concepts.
    pub fn rebind(&self, resolve: &dyn Fn(&str) -> PlanResult<Concept>) -> PlanResult<Concept> {
        if self.is_placeholder() {
            return resolve(&self.address());
        }
        let lineage = match &self.lineage {
            Some(lineage) => Some(Box::new(lineage.rebind(resolve)?)),
            None => None,
        };
        let keys = self
            .keys
            .iter()
            .map(|key| key.rebind(resolve))
            .collect::<PlanResult<Vec<_>>>()?;
        let datatype = match (&lineage, self.datatype) {
            (Some(lineage), DataType::Unknown) => lineage.output_datatype(),
            (_, datatype) => datatype,
        };
        let mut concept = Self {
            name: self.name.clone(),
            datatype,
            purpose: self.purpose,
            metadata: self.metadata.clone(),
            lineage,
            namespace: self.namespace.clone(),
            keys,
            grain: Grain::default(),
        };
        concept.grain = if self.grain.has_placeholders() {
            concept.declared_grain()
        } else {
            self.grain.clone()
        };
        Ok(concept)
    }
}

impl PartialEq for Concept {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.datatype == other.datatype
            && self.purpose == other.purpose
            && self.namespace == other.namespace
            && self.grain == other.grain
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let grain: Vec<String> = self
            .grain
            .components()
            .iter()
            .map(|c| c.address())
            .collect();
        write!(f, "{}<{}>", self.address(), grain.join(","))
    }
}

/// Deduplicate concepts by address, keeping the first occurrence.
pub fn unique_concepts<I>(concepts: I) -> Vec<Concept>
where
    I: IntoIterator<Item = Concept>,
{
    let mut seen = HashSet::new();
    concepts
        .into_iter()
        .filter(|c| seen.insert(c.address()))
        .collect()
}

/// Addresses of a concept list, in order.
pub fn addresses(concepts: &[Concept]) -> Vec<String> {
    concepts.iter().map(|c| c.address()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::function::{AggregateWrapper, Expr, Function};
    use crate::model::types::FunctionType;

    fn product_id() -> Concept {
        Concept::key("product_id", DataType::Integer)
    }

    #[test]
    fn test_key_is_its_own_grain() {
        let key = product_id();
        let grain = key.with_default_grain().grain;
        assert_eq!(grain.components().len(), 1);
        assert_eq!(grain.components()[0].address(), "local.product_id");
    }

    #[test]
    fn test_property_grain_is_owning_keys() {
        let name = Concept::property("product_name", DataType::String, vec![product_id()]);
        let addresses: Vec<String> = name.grain.components().iter().map(|c| c.address()).collect();
        assert_eq!(addresses, vec!["local.product_id"]);
    }

    #[test]
    fn test_metric_grain_is_abstract() {
        let metric = Concept::metric("revenue_total", DataType::Float);
        assert!(metric.with_default_grain().grain.is_abstract());
    }

    #[test]
    fn test_equality_ignores_keys_but_not_grain() {
        let a = Concept::property("name", DataType::String, vec![product_id()]);
        let b = Concept::property("name", DataType::String, vec![product_id()]);
        assert_eq!(a, b);
        assert_ne!(a, b.with_grain(Grain::default()));
    }

    #[test]
    fn test_safe_address() {
        let local = Concept::key("order.id", DataType::Integer);
        assert_eq!(local.safe_address(), "order_id");
        let namespaced = local.with_namespace("sales");
        assert_eq!(namespaced.safe_address(), "sales_order_id");
        assert_eq!(namespaced.address(), "sales.order.id");
    }

    #[test]
    fn test_with_namespace_moves_key_grain() {
        let key = product_id().with_namespace("store");
        assert_eq!(key.grain.components()[0].address(), "store.product_id");
    }

    #[test]
    fn test_derivation_from_lineage() {
        let amount = Concept::property("amount", DataType::Float, vec![product_id()]);
        let sum = Function::new(FunctionType::Sum, vec![Expr::from(amount.clone())]).unwrap();
        let total = Concept::derived("total", Purpose::Metric, Lineage::Function(sum.clone()));
        assert_eq!(total.derivation(), Derivation::Aggregate);

        let upper_name = Concept::property("name", DataType::String, vec![product_id()]);
        let upper = Function::new(FunctionType::Upper, vec![Expr::from(upper_name)]).unwrap();
        let shout = Concept::derived("shout", Purpose::Auto, Lineage::Function(upper));
        assert_eq!(shout.derivation(), Derivation::Basic);
        assert_eq!(shout.purpose, Purpose::Property);

        let wrapped = Concept::derived(
            "total_by_product",
            Purpose::Metric,
            Lineage::Aggregate(AggregateWrapper::new(sum, vec![product_id()])),
        );
        assert_eq!(wrapped.derivation(), Derivation::Aggregate);
        assert_eq!(wrapped.grain.components()[0].address(), "local.product_id");
    }

    #[test]
    fn test_derived_property_grain_follows_arguments() {
        let category_id = Concept::key("category_id", DataType::Integer);
        let category_name =
            Concept::property("category_name", DataType::String, vec![category_id]);
        let len = Function::new(FunctionType::Length, vec![Expr::from(category_name)]).unwrap();
        let name_length = Concept::derived("category_name_length", Purpose::Property, Lineage::Function(len));
        let grain: Vec<String> = name_length
            .grain
            .components()
            .iter()
            .map(|c| c.address())
            .collect();
        assert_eq!(grain, vec!["local.category_id"]);
    }

    #[test]
    fn test_sources_are_transitive() {
        let amount = Concept::property("amount", DataType::Float, vec![product_id()]);
        let doubled = Concept::derived(
            "doubled",
            Purpose::Property,
            Lineage::Function(
                Function::new(
                    FunctionType::Multiply,
                    vec![Expr::from(amount.clone()), Expr::integer(2)],
                )
                .unwrap(),
            ),
        );
        let total = Concept::derived(
            "total_doubled",
            Purpose::Metric,
            Lineage::Function(Function::new(FunctionType::Sum, vec![Expr::from(doubled)]).unwrap()),
        );
        let names: Vec<String> = total.sources().iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["doubled", "amount"]);
    }

    #[test]
    fn test_unique_concepts_keeps_first() {
        let a = product_id();
        let b = product_id().with_grain(Grain::default());
        let deduped = unique_concepts(vec![a.clone(), b]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0], a);
    }
}
