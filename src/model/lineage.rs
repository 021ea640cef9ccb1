//! Derivation wrappers: how a concept is computed from other concepts.

use serde::Serialize;

use super::concept::Concept;
use super::condition::WhereClause;
use super::function::{AggregateWrapper, Function};
use super::select::MultiSelect;
use super::types::{DataType, Ordering, Purpose, WindowType};
use crate::error::PlanResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItem {
    pub expr: Concept,
    pub order: Ordering,
}

impl OrderItem {
    pub fn asc(expr: Concept) -> Self {
        Self {
            expr,
            order: Ordering::Ascending,
        }
    }

    pub fn desc(expr: Concept) -> Self {
        Self {
            expr,
            order: Ordering::Descending,
        }
    }
}

/// A ranking, lag or lead computed over partitions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowItem {
    pub window_type: WindowType,
    pub content: Concept,
    pub order_by: Vec<OrderItem>,
    /// Partition concepts.
    pub over: Vec<Concept>,
    /// Offset for lag and lead.
    pub index: Option<i64>,
}

impl WindowItem {
    pub fn new(window_type: WindowType, content: Concept) -> Self {
        Self {
            window_type,
            content,
            order_by: Vec::new(),
            over: Vec::new(),
            index: None,
        }
    }

    pub fn with_over(mut self, over: Vec<Concept>) -> Self {
        self.over = over;
        self
    }

    pub fn with_order_by(mut self, order_by: Vec<OrderItem>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn with_index(mut self, index: i64) -> Self {
        self.index = Some(index);
        self
    }

    /// Everything the window reads, content first.
    pub fn arguments(&self) -> Vec<Concept> {
        let mut output = vec![self.content.clone()];
        output.extend(self.over.iter().cloned());
        output.extend(self.order_by.iter().map(|o| o.expr.clone()));
        output
    }
}

/// A concept restricted to the rows matching a where clause.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterItem {
    pub content: Concept,
    pub where_clause: WhereClause,
}

impl FilterItem {
    pub fn new(content: Concept, where_clause: WhereClause) -> Self {
        Self {
            content,
            where_clause,
        }
    }

    pub fn arguments(&self) -> Vec<Concept> {
        let mut output = vec![self.content.clone()];
        output.extend(self.where_clause.concept_arguments());
        output
    }
}

/// The derivation of a computed concept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Lineage {
    Function(Function),
    Window(WindowItem),
    Filter(FilterItem),
    Aggregate(AggregateWrapper),
    MultiSelect(MultiSelect),
}

impl Lineage {
    pub fn concept_arguments(&self) -> Vec<Concept> {
        match self {
            Lineage::Function(function) => function.concept_arguments(),
            Lineage::Window(window) => window.arguments(),
            Lineage::Filter(filter) => filter.arguments(),
            Lineage::Aggregate(wrapper) => wrapper.concept_arguments(),
            Lineage::MultiSelect(multiselect) => multiselect.concept_arguments(),
        }
    }

    pub fn output_datatype(&self) -> DataType {
        match self {
            Lineage::Function(function) => function.output_datatype,
            Lineage::Window(window) => match window.window_type {
                WindowType::RowNumber | WindowType::Rank => DataType::Integer,
                WindowType::Lag | WindowType::Lead => window.content.datatype,
            },
            Lineage::Filter(filter) => filter.content.datatype,
            Lineage::Aggregate(wrapper) => wrapper.function.output_datatype,
            Lineage::MultiSelect(multiselect) => multiselect
                .align
                .items
                .first()
                .and_then(|item| item.concepts.first())
                .map(|c| c.datatype)
                .unwrap_or(DataType::Unknown),
        }
    }

    pub fn output_purpose(&self) -> Purpose {
        match self {
            Lineage::Function(function) => function.output_purpose,
            Lineage::Window(_) => Purpose::Property,
            Lineage::Filter(filter) => filter.content.purpose,
            Lineage::Aggregate(_) => Purpose::Metric,
            Lineage::MultiSelect(multiselect) => multiselect
                .align
                .items
                .first()
                .and_then(|item| item.concepts.first())
                .map(|c| c.purpose)
                .unwrap_or(Purpose::Key),
        }
    }

    pub fn with_namespace(&self, namespace: &str) -> Lineage {
        match self {
            Lineage::Function(function) => Lineage::Function(function.with_namespace(namespace)),
            Lineage::Window(window) => Lineage::Window(WindowItem {
                window_type: window.window_type,
                content: window.content.with_namespace(namespace),
                order_by: window
                    .order_by
                    .iter()
                    .map(|o| OrderItem {
                        expr: o.expr.with_namespace(namespace),
                        order: o.order,
                    })
                    .collect(),
                over: window.over.iter().map(|c| c.with_namespace(namespace)).collect(),
                index: window.index,
            }),
            Lineage::Filter(filter) => Lineage::Filter(FilterItem {
                content: filter.content.with_namespace(namespace),
                where_clause: filter.where_clause.with_namespace(namespace),
            }),
            Lineage::Aggregate(wrapper) => Lineage::Aggregate(wrapper.with_namespace(namespace)),
            Lineage::MultiSelect(multiselect) => Lineage::MultiSelect(multiselect.clone()),
        }
    }

    pub fn rebind(&self, resolve: &dyn Fn(&str) -> PlanResult<Concept>) -> PlanResult<Lineage> {
        Ok(match self {
            Lineage::Function(function) => Lineage::Function(function.rebind(resolve)?),
            Lineage::Window(window) => Lineage::Window(WindowItem {
                window_type: window.window_type,
                content: window.content.rebind(resolve)?,
                order_by: window
                    .order_by
                    .iter()
                    .map(|o| {
                        Ok(OrderItem {
                            expr: o.expr.rebind(resolve)?,
                            order: o.order,
                        })
                    })
                    .collect::<PlanResult<Vec<_>>>()?,
                over: window
                    .over
                    .iter()
                    .map(|c| c.rebind(resolve))
                    .collect::<PlanResult<Vec<_>>>()?,
                index: window.index,
            }),
            Lineage::Filter(filter) => Lineage::Filter(FilterItem {
                content: filter.content.rebind(resolve)?,
                where_clause: filter.where_clause.rebind(resolve)?,
            }),
            Lineage::Aggregate(wrapper) => Lineage::Aggregate(wrapper.rebind(resolve)?),
            Lineage::MultiSelect(multiselect) => Lineage::MultiSelect(multiselect.clone()),
        })
    }
}
