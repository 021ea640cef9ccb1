//! Row predicates.

use serde::Serialize;

use super::concept::{unique_concepts, Concept};
use super::function::Expr;
use super::grain::Grain;
use super::types::{BooleanOperator, ComparisonOperator, Purpose};
use crate::error::PlanResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub left: Expr,
    pub right: Expr,
    pub operator: ComparisonOperator,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conditional {
    pub left: Box<Condition>,
    pub right: Box<Condition>,
    pub operator: BooleanOperator,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Condition {
    Comparison(Comparison),
    Conditional(Conditional),
    Parenthetical(Box<Condition>),
}

impl Condition {
    pub fn compare(
        left: impl Into<Expr>,
        operator: ComparisonOperator,
        right: impl Into<Expr>,
    ) -> Self {
        Condition::Comparison(Comparison {
            left: left.into(),
            right: right.into(),
            operator,
        })
    }

    pub fn and(self, other: Condition) -> Self {
        Condition::Conditional(Conditional {
            left: Box::new(self),
            right: Box::new(other),
            operator: BooleanOperator::And,
        })
    }

    pub fn or(self, other: Condition) -> Self {
        Condition::Conditional(Conditional {
            left: Box::new(self),
            right: Box::new(other),
            operator: BooleanOperator::Or,
        })
    }

    pub fn concept_arguments(&self) -> Vec<Concept> {
        match self {
            Condition::Comparison(comparison) => {
                let mut output = comparison.left.concept_arguments();
                output.extend(comparison.right.concept_arguments());
                output
            }
            Condition::Conditional(conditional) => {
                let mut output = conditional.left.concept_arguments();
                output.extend(conditional.right.concept_arguments());
                output
            }
            Condition::Parenthetical(inner) => inner.concept_arguments(),
        }
    }

    pub fn with_namespace(&self, namespace: &str) -> Condition {
        match self {
            Condition::Comparison(comparison) => Condition::Comparison(Comparison {
                left: comparison.left.with_namespace(namespace),
                right: comparison.right.with_namespace(namespace),
                operator: comparison.operator,
            }),
            Condition::Conditional(conditional) => Condition::Conditional(Conditional {
                left: Box::new(conditional.left.with_namespace(namespace)),
                right: Box::new(conditional.right.with_namespace(namespace)),
                operator: conditional.operator,
            }),
            Condition::Parenthetical(inner) => {
                Condition::Parenthetical(Box::new(inner.with_namespace(namespace)))
            }
        }
    }

    pub fn rebind(&self, resolve: &dyn Fn(&str) -> PlanResult<Concept>) -> PlanResult<Condition> {
        Ok(match self {
            Condition::Comparison(comparison) => Condition::Comparison(Comparison {
                left: comparison.left.rebind(resolve)?,
                right: comparison.right.rebind(resolve)?,
                operator: comparison.operator,
            }),
            Condition::Conditional(conditional) => Condition::Conditional(Conditional {
                left: Box::new(conditional.left.rebind(resolve)?),
                right: Box::new(conditional.right.rebind(resolve)?),
                operator: conditional.operator,
            }),
            Condition::Parenthetical(inner) => {
                Condition::Parenthetical(Box::new(inner.rebind(resolve)?))
            }
        })
    }
}

/// AND two optional conditions together.
pub fn and_conditions(left: Option<Condition>, right: Option<Condition>) -> Option<Condition> {
    match (left, right) {
        (Some(left), Some(right)) if left == right => Some(left),
        (Some(left), Some(right)) => Some(left.and(right)),
        (left, None) => left,
        (None, right) => right,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhereClause {
    pub conditional: Condition,
}

impl WhereClause {
    pub fn new(conditional: Condition) -> Self {
        Self { conditional }
    }

    /// Concepts referenced by the predicate, deduplicated.
    pub fn concept_arguments(&self) -> Vec<Concept> {
        unique_concepts(self.conditional.concept_arguments())
    }

    /// Keys referenced by the predicate.
    pub fn grain(&self) -> Grain {
        Grain::new(
            self.concept_arguments()
                .into_iter()
                .filter(|c| c.purpose == Purpose::Key),
        )
    }

    pub fn with_namespace(&self, namespace: &str) -> Self {
        Self {
            conditional: self.conditional.with_namespace(namespace),
        }
    }

    pub fn rebind(&self, resolve: &dyn Fn(&str) -> PlanResult<Concept>) -> PlanResult<Self> {
        Ok(Self {
            conditional: self.conditional.rebind(resolve)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::DataType;

    #[test]
    fn test_arguments_collected_from_both_sides() {
        let y = Concept::metric("y", DataType::Integer);
        let z = Concept::key("z", DataType::Integer);
        let condition = Condition::compare(&y, ComparisonOperator::Gt, Expr::integer(0))
            .and(Condition::compare(&z, ComparisonOperator::Eq, &y));
        let clause = WhereClause::new(condition);
        let names: Vec<String> = clause
            .concept_arguments()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert_eq!(names, vec!["y", "z"]);
        assert!(clause.grain().contains("local.z"));
        assert!(!clause.grain().contains("local.y"));
    }

    #[test]
    fn test_and_conditions_skips_missing_and_duplicates() {
        let y = Concept::metric("y", DataType::Integer);
        let condition = Condition::compare(&y, ComparisonOperator::Gt, Expr::integer(0));
        assert_eq!(and_conditions(None, Some(condition.clone())), Some(condition.clone()));
        assert_eq!(
            and_conditions(Some(condition.clone()), Some(condition.clone())),
            Some(condition.clone())
        );
        assert!(matches!(
            and_conditions(Some(condition.clone()), Some(condition.clone().or(condition))),
            Some(Condition::Conditional(_))
        ));
    }
}
