//! Select statements and multi-select rowsets.

use serde::Serialize;

use super::concept::{unique_concepts, Concept, DEFAULT_NAMESPACE};
use super::condition::WhereClause;
use super::function::Function;
use super::grain::{concept_list_to_grain, Grain};
use super::lineage::{Lineage, OrderItem};
use super::types::{Derivation, Modifier, Purpose};

/// A function whose result is exposed as a new concept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConceptTransform {
    pub function: Function,
    pub output: Concept,
}

impl ConceptTransform {
    pub fn new(name: impl Into<String>, function: Function) -> Self {
        let output = Concept::derived(name, Purpose::Auto, Lineage::Function(function.clone()));
        Self { function, output }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SelectContent {
    Concept(Concept),
    Transform(ConceptTransform),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectItem {
    pub content: SelectContent,
    pub modifiers: Vec<Modifier>,
}

impl SelectItem {
    pub fn concept(concept: Concept) -> Self {
        Self {
            content: SelectContent::Concept(concept),
            modifiers: Vec::new(),
        }
    }

    pub fn transform(transform: ConceptTransform) -> Self {
        Self {
            content: SelectContent::Transform(transform),
            modifiers: Vec::new(),
        }
    }

    pub fn hidden(mut self) -> Self {
        if !self.is_hidden() {
            self.modifiers.push(Modifier::Hidden);
        }
        self
    }

    pub fn is_hidden(&self) -> bool {
        self.modifiers.contains(&Modifier::Hidden)
    }

    pub fn output(&self) -> &Concept {
        match &self.content {
            SelectContent::Concept(concept) => concept,
            SelectContent::Transform(transform) => &transform.output,
        }
    }
}

impl From<Concept> for SelectItem {
    fn from(concept: Concept) -> Self {
        SelectItem::concept(concept)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderBy {
    pub items: Vec<OrderItem>,
}

/// A query over the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Select {
    pub selection: Vec<SelectItem>,
    pub where_clause: Option<WhereClause>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Select {
    pub fn new<I, T>(selection: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<SelectItem>,
    {
        Self {
            selection: selection.into_iter().map(Into::into).collect(),
            where_clause: None,
            order_by: None,
            limit: None,
        }
    }

    pub fn with_where(mut self, where_clause: WhereClause) -> Self {
        self.where_clause = Some(where_clause);
        self
    }

    pub fn with_order_by(mut self, items: Vec<OrderItem>) -> Self {
        self.order_by = Some(OrderBy { items });
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn selected(&self) -> Vec<Concept> {
        unique_concepts(self.selection.iter().map(|item| item.output().clone()))
    }

    /// Keys and uncovered properties among the selected concepts.
    pub fn grain(&self) -> Grain {
        concept_list_to_grain(&self.selected())
    }

    /// Aggregates without an explicit `by` are evaluated at the statement grain.
    fn regrain(&self, concept: &Concept, grain: &Grain) -> Concept {
        let explicit_by = matches!(
            concept.lineage.as_deref(),
            Some(Lineage::Aggregate(wrapper)) if !wrapper.by.is_empty()
        );
        if concept.derivation() == Derivation::Aggregate && !explicit_by {
            concept.with_grain(grain.clone())
        } else {
            concept.clone()
        }
    }

    /// Visible outputs, in selection order.
    pub fn output_components(&self) -> Vec<Concept> {
        let grain = self.grain();
        unique_concepts(
            self.selection
                .iter()
                .filter(|item| !item.is_hidden())
                .map(|item| self.regrain(item.output(), &grain)),
        )
    }

    pub fn hidden_components(&self) -> Vec<Concept> {
        let grain = self.grain();
        self.selection
            .iter()
            .filter(|item| item.is_hidden())
            .map(|item| self.regrain(item.output(), &grain))
            .collect()
    }

    /// Everything that must be planned: outputs, hidden items and where-clause arguments.
    pub fn input_components(&self) -> Vec<Concept> {
        let mut output = self.output_components();
        output.extend(self.hidden_components());
        if let Some(where_clause) = &self.where_clause {
            output.extend(where_clause.concept_arguments());
        }
        unique_concepts(output)
    }

    /// Concepts introduced by transforms.
    pub fn local_concepts(&self) -> Vec<Concept> {
        self.selection
            .iter()
            .filter_map(|item| match &item.content {
                SelectContent::Transform(transform) => Some(transform.output.clone()),
                SelectContent::Concept(_) => None,
            })
            .collect()
    }
}

// ============================================================================
// Multi-select
// ============================================================================

/// One aligned output: several branch concepts merged under a new name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignItem {
    pub alias: String,
    pub concepts: Vec<Concept>,
}

impl AlignItem {
    pub fn new(alias: impl Into<String>, concepts: Vec<Concept>) -> Self {
        Self {
            alias: alias.into(),
            concepts,
        }
    }

    pub fn aligns(&self, concept: &Concept) -> bool {
        let address = concept.address();
        self.concepts.iter().any(|c| c.address() == address)
    }

    /// The merge concept this item exposes.
    pub fn gen_concept(&self, parent: &MultiSelect) -> Concept {
        let first = self.concepts.first();
        let purpose = first.map(|c| c.purpose).unwrap_or(Purpose::Key);
        let mut concept = Concept::placeholder(parent.namespace.clone(), self.alias.clone());
        concept.datatype = first.map(|c| c.datatype).unwrap_or(concept.datatype);
        concept.purpose = purpose;
        concept.lineage = Some(Box::new(Lineage::MultiSelect(parent.clone())));
        concept.grain = match purpose {
            Purpose::Key => concept.default_grain(),
            _ => Grain::default(),
        };
        concept
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlignClause {
    pub items: Vec<AlignItem>,
}

/// Several independent selects aligned on shared merge concepts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiSelect {
    pub selects: Vec<Select>,
    pub align: AlignClause,
    pub namespace: String,
}

impl MultiSelect {
    pub fn new(selects: Vec<Select>, align: AlignClause) -> Self {
        Self {
            selects,
            align,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// One merge concept per align item.
    pub fn derived_concepts(&self) -> Vec<Concept> {
        self.align
            .items
            .iter()
            .map(|item| item.gen_concept(self))
            .collect()
    }

    /// The merge concept `concept` is aligned into, if any.
    pub fn get_merge_concept(&self, concept: &Concept) -> Option<Concept> {
        self.align
            .items
            .iter()
            .find(|item| item.aligns(concept))
            .map(|item| item.gen_concept(self))
    }

    /// Outputs of every branch.
    pub fn concept_arguments(&self) -> Vec<Concept> {
        unique_concepts(self.selects.iter().flat_map(|s| s.output_components()))
    }
}
