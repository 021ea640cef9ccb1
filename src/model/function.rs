//! Functions, expressions, and the static signature table.
//!
//! Every operator has one entry in [`SIGNATURES`] describing its argument
//! count, accepted input types, and output type. [`Function::new`] checks
//! arguments against that entry before a function can exist.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

use super::concept::Concept;
use super::condition::Condition;
use super::types::{DataType, FunctionType, Purpose};
use crate::error::{PlanError, PlanResult};

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl Literal {
    pub fn datatype(&self) -> Option<DataType> {
        match self {
            Literal::String(_) => Some(DataType::String),
            Literal::Integer(_) => Some(DataType::Integer),
            Literal::Float(_) => Some(DataType::Float),
            Literal::Bool(_) => Some(DataType::Bool),
            Literal::Null => None,
        }
    }
}

/// One `WHEN condition THEN result` arm of a case expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseWhen {
    pub condition: Condition,
    pub result: Expr,
}

/// An argument position: a concept reference, a literal, or a nested expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Concept(Concept),
    Literal(Literal),
    Function(Box<Function>),
    Aggregate(Box<AggregateWrapper>),
    Case {
        whens: Vec<CaseWhen>,
        otherwise: Option<Box<Expr>>,
    },
    /// Target of a cast.
    DataType(DataType),
    List(Vec<Literal>),
}

impl Expr {
    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(value.into()))
    }

    pub fn integer(value: i64) -> Self {
        Expr::Literal(Literal::Integer(value))
    }

    pub fn float(value: f64) -> Self {
        Expr::Literal(Literal::Float(value))
    }

    pub fn bool(value: bool) -> Self {
        Expr::Literal(Literal::Bool(value))
    }

    pub fn concept_arguments(&self) -> Vec<Concept> {
        match self {
            Expr::Concept(concept) => vec![concept.clone()],
            Expr::Function(function) => function.concept_arguments(),
            Expr::Aggregate(wrapper) => wrapper.concept_arguments(),
            Expr::Case { whens, otherwise } => {
                let mut output = Vec::new();
                for when in whens {
                    output.extend(when.condition.concept_arguments());
                    output.extend(when.result.concept_arguments());
                }
                if let Some(otherwise) = otherwise {
                    output.extend(otherwise.concept_arguments());
                }
                output
            }
            Expr::Literal(_) | Expr::DataType(_) | Expr::List(_) => Vec::new(),
        }
    }

    /// Output type, when it can be known statically.
    pub fn datatype(&self) -> Option<DataType> {
        match self {
            Expr::Concept(concept) => Some(concept.datatype),
            Expr::Literal(literal) => literal.datatype(),
            Expr::Function(function) => Some(function.output_datatype),
            Expr::Aggregate(wrapper) => Some(wrapper.function.output_datatype),
            Expr::Case { whens, .. } => whens.first().and_then(|w| w.result.datatype()),
            Expr::DataType(datatype) => Some(*datatype),
            Expr::List(items) => items.first().and_then(|l| l.datatype()),
        }
    }

    fn purpose(&self) -> Option<Purpose> {
        match self {
            Expr::Concept(concept) => Some(concept.purpose),
            Expr::Function(function) => Some(function.output_purpose),
            Expr::Aggregate(_) => Some(Purpose::Metric),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Expr::Concept(concept) => concept.address(),
            Expr::Literal(literal) => format!("{:?}", literal),
            Expr::Function(function) => function.operator.to_string(),
            Expr::Aggregate(wrapper) => wrapper.function.operator.to_string(),
            Expr::Case { .. } => "case".to_string(),
            Expr::DataType(datatype) => datatype.to_string(),
            Expr::List(_) => "list".to_string(),
        }
    }

    pub fn with_namespace(&self, namespace: &str) -> Expr {
        match self {
            Expr::Concept(concept) => Expr::Concept(concept.with_namespace(namespace)),
            Expr::Function(function) => Expr::Function(Box::new(function.with_namespace(namespace))),
            Expr::Aggregate(wrapper) => {
                Expr::Aggregate(Box::new(wrapper.with_namespace(namespace)))
            }
            Expr::Case { whens, otherwise } => Expr::Case {
                whens: whens
                    .iter()
                    .map(|w| CaseWhen {
                        condition: w.condition.with_namespace(namespace),
                        result: w.result.with_namespace(namespace),
                    })
                    .collect(),
                otherwise: otherwise
                    .as_ref()
                    .map(|o| Box::new(o.with_namespace(namespace))),
            },
            other => other.clone(),
        }
    }

    pub fn rebind(&self, resolve: &dyn Fn(&str) -> PlanResult<Concept>) -> PlanResult<Expr> {
        Ok(match self {
            Expr::Concept(concept) => Expr::Concept(concept.rebind(resolve)?),
            Expr::Function(function) => Expr::Function(Box::new(function.rebind(resolve)?)),
            Expr::Aggregate(wrapper) => Expr::Aggregate(Box::new(wrapper.rebind(resolve)?)),
            Expr::Case { whens, otherwise } => Expr::Case {
                whens: whens
                    .iter()
                    .map(|w| {
                        Ok(CaseWhen {
                            condition: w.condition.rebind(resolve)?,
                            result: w.result.rebind(resolve)?,
                        })
                    })
                    .collect::<PlanResult<Vec<_>>>()?,
                otherwise: match otherwise {
                    Some(o) => Some(Box::new(o.rebind(resolve)?)),
                    None => None,
                },
            },
            other => other.clone(),
        })
    }
}

impl From<Concept> for Expr {
    fn from(concept: Concept) -> Self {
        Expr::Concept(concept)
    }
}

impl From<&Concept> for Expr {
    fn from(concept: &Concept) -> Self {
        Expr::Concept(concept.clone())
    }
}

impl From<Literal> for Expr {
    fn from(literal: Literal) -> Self {
        Expr::Literal(literal)
    }
}

impl From<Function> for Expr {
    fn from(function: Function) -> Self {
        Expr::Function(Box::new(function))
    }
}

// ============================================================================
// Signatures
// ============================================================================

const NUMERIC: &[DataType] = &[DataType::Integer, DataType::Float, DataType::Number];
const STRING: &[DataType] = &[DataType::String];
const DATE_INPUT: &[DataType] = &[
    DataType::Date,
    DataType::Timestamp,
    DataType::Datetime,
    DataType::String,
];
const TIMESTAMP_INPUT: &[DataType] = &[DataType::Timestamp, DataType::String];
const TIME_PART_INPUT: &[DataType] = &[DataType::Timestamp, DataType::Datetime];
const DATE_PART_INPUT: &[DataType] = &[DataType::Date, DataType::Timestamp, DataType::Datetime];
const SIZED: &[DataType] = &[
    DataType::String,
    DataType::Array,
    DataType::Map,
    DataType::List,
];
const CASTABLE: &[DataType] = &[
    DataType::Integer,
    DataType::String,
    DataType::Float,
    DataType::Number,
];

/// Accepted input types.
#[derive(Debug, Clone, Copy)]
pub enum InputTypes {
    Any,
    /// Every argument must be one of these types.
    Uniform(&'static [DataType]),
    /// One set per position; positions past the end are unchecked.
    Positional(&'static [&'static [DataType]]),
}

impl InputTypes {
    fn allowed(&self, position: usize) -> Option<&'static [DataType]> {
        match self {
            InputTypes::Any => None,
            InputTypes::Uniform(types) => Some(*types),
            InputTypes::Positional(positions) => positions.get(position).copied(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum OutputType {
    Fixed(DataType),
    /// Same type as the first argument.
    FirstArgument,
    /// The datatype literal given as the last argument.
    CastTarget,
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionSignature {
    pub min_args: usize,
    pub max_args: usize,
    pub inputs: InputTypes,
    pub output: OutputType,
}

impl FunctionSignature {
    const fn new(min_args: usize, max_args: usize, inputs: InputTypes, output: OutputType) -> Self {
        Self {
            min_args,
            max_args,
            inputs,
            output,
        }
    }

    fn expected(&self) -> String {
        if self.min_args == self.max_args {
            self.min_args.to_string()
        } else if self.max_args == usize::MAX {
            format!("at least {}", self.min_args)
        } else {
            format!("{} to {}", self.min_args, self.max_args)
        }
    }
}

/// Signature of every operator.
pub static SIGNATURES: Lazy<HashMap<FunctionType, FunctionSignature>> = Lazy::new(|| {
    use FunctionType::*;
    use InputTypes::{Any, Positional, Uniform};
    use OutputType::{CastTarget, FirstArgument, Fixed};

    let many = usize::MAX;
    HashMap::from([
        (Cast, FunctionSignature::new(2, 2, Positional(&[CASTABLE]), CastTarget)),
        (Concat, FunctionSignature::new(1, many, Uniform(STRING), Fixed(DataType::String))),
        (Coalesce, FunctionSignature::new(1, many, Any, FirstArgument)),
        (Constant, FunctionSignature::new(1, 1, Any, FirstArgument)),
        (Case, FunctionSignature::new(1, 1, Any, FirstArgument)),
        (Add, FunctionSignature::new(2, 2, Any, FirstArgument)),
        (Subtract, FunctionSignature::new(2, 2, Any, FirstArgument)),
        (Multiply, FunctionSignature::new(2, 2, Any, FirstArgument)),
        (Divide, FunctionSignature::new(2, 2, Any, FirstArgument)),
        (
            Round,
            FunctionSignature::new(1, 2, Positional(&[NUMERIC, &[DataType::Integer]]), FirstArgument),
        ),
        (Count, FunctionSignature::new(1, 1, Any, Fixed(DataType::Integer))),
        (CountDistinct, FunctionSignature::new(1, 1, Any, Fixed(DataType::Integer))),
        (Sum, FunctionSignature::new(1, 1, Uniform(NUMERIC), FirstArgument)),
        (Avg, FunctionSignature::new(1, 1, Uniform(NUMERIC), FirstArgument)),
        (Max, FunctionSignature::new(1, 1, Any, FirstArgument)),
        (Min, FunctionSignature::new(1, 1, Any, FirstArgument)),
        (Length, FunctionSignature::new(1, 1, Uniform(SIZED), Fixed(DataType::Integer))),
        (Like, FunctionSignature::new(2, 2, Uniform(STRING), Fixed(DataType::Bool))),
        (Ilike, FunctionSignature::new(2, 2, Uniform(STRING), Fixed(DataType::Bool))),
        (Lower, FunctionSignature::new(1, 1, Uniform(STRING), Fixed(DataType::String))),
        (Upper, FunctionSignature::new(1, 1, Uniform(STRING), Fixed(DataType::String))),
        (Date, FunctionSignature::new(1, 1, Uniform(DATE_INPUT), Fixed(DataType::Date))),
        (Datetime, FunctionSignature::new(1, 1, Uniform(DATE_INPUT), Fixed(DataType::Datetime))),
        (
            Timestamp,
            FunctionSignature::new(1, 1, Uniform(TIMESTAMP_INPUT), Fixed(DataType::Timestamp)),
        ),
        (Second, FunctionSignature::new(1, 1, Uniform(TIME_PART_INPUT), Fixed(DataType::Integer))),
        (Minute, FunctionSignature::new(1, 1, Uniform(TIME_PART_INPUT), Fixed(DataType::Integer))),
        (Hour, FunctionSignature::new(1, 1, Uniform(TIME_PART_INPUT), Fixed(DataType::Integer))),
        (Day, FunctionSignature::new(1, 1, Uniform(DATE_PART_INPUT), Fixed(DataType::Integer))),
        (DayOfWeek, FunctionSignature::new(1, 1, Uniform(DATE_PART_INPUT), Fixed(DataType::Integer))),
        (Week, FunctionSignature::new(1, 1, Uniform(DATE_PART_INPUT), Fixed(DataType::Integer))),
        (Month, FunctionSignature::new(1, 1, Uniform(DATE_PART_INPUT), Fixed(DataType::Integer))),
        (Quarter, FunctionSignature::new(1, 1, Uniform(DATE_PART_INPUT), Fixed(DataType::Integer))),
        (Year, FunctionSignature::new(1, 1, Uniform(DATE_PART_INPUT), Fixed(DataType::Integer))),
    ])
});

/// Look up the signature of an operator.
pub fn signature(operator: FunctionType) -> FunctionSignature {
    SIGNATURES
        .get(&operator)
        .copied()
        .unwrap_or(FunctionSignature::new(0, usize::MAX, InputTypes::Any, OutputType::FirstArgument))
}

// ============================================================================
// Functions
// ============================================================================

/// A validated function application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    pub operator: FunctionType,
    pub arguments: Vec<Expr>,
    pub output_datatype: DataType,
    pub output_purpose: Purpose,
}

impl Function {
    /// Validate `arguments` against the operator signature.
    ///
    /// Arguments of unknown type (forward references) are not checked; they
    /// are validated again once bound.
    pub fn new(operator: FunctionType, arguments: Vec<Expr>) -> PlanResult<Self> {
        let signature = signature(operator);
        if arguments.len() < signature.min_args || arguments.len() > signature.max_args {
            return Err(PlanError::ArgumentCount {
                function: operator.to_string(),
                expected: signature.expected(),
                got: arguments.len(),
            });
        }

        for (position, argument) in arguments.iter().enumerate() {
            let Some(allowed) = signature.inputs.allowed(position) else {
                continue;
            };
            let datatype = match argument {
                Expr::Concept(concept) => Some(concept.datatype),
                Expr::Function(function) => Some(function.output_datatype),
                Expr::Aggregate(wrapper) => Some(wrapper.function.output_datatype),
                Expr::Literal(literal) => literal.datatype(),
                Expr::Case { .. } | Expr::DataType(_) | Expr::List(_) => None,
            };
            match datatype {
                Some(DataType::Unknown) | None => {}
                Some(datatype) if allowed.contains(&datatype) => {}
                Some(datatype) => {
                    return Err(PlanError::InvalidArgumentType {
                        function: operator.to_string(),
                        argument: argument.describe(),
                        datatype: datatype.to_string(),
                    });
                }
            }
        }

        let output_datatype = match signature.output {
            OutputType::Fixed(datatype) => datatype,
            OutputType::FirstArgument => arguments
                .first()
                .and_then(|a| a.datatype())
                .unwrap_or(DataType::Unknown),
            OutputType::CastTarget => arguments
                .last()
                .and_then(|a| a.datatype())
                .unwrap_or(DataType::Unknown),
        };
        let output_purpose = output_purpose(operator, &arguments);

        Ok(Self {
            operator,
            arguments,
            output_datatype,
            output_purpose,
        })
    }

    pub fn with_output_datatype(mut self, datatype: DataType) -> Self {
        self.output_datatype = datatype;
        self
    }

    pub fn with_output_purpose(mut self, purpose: Purpose) -> Self {
        self.output_purpose = purpose;
        self
    }

    pub fn concept_arguments(&self) -> Vec<Concept> {
        self.arguments
            .iter()
            .flat_map(|a| a.concept_arguments())
            .collect()
    }

    pub fn with_namespace(&self, namespace: &str) -> Function {
        Function {
            operator: self.operator,
            arguments: self
                .arguments
                .iter()
                .map(|a| a.with_namespace(namespace))
                .collect(),
            output_datatype: self.output_datatype,
            output_purpose: self.output_purpose,
        }
    }

    /// Rebind arguments and run validation again.
    pub fn rebind(&self, resolve: &dyn Fn(&str) -> PlanResult<Concept>) -> PlanResult<Function> {
        let arguments = self
            .arguments
            .iter()
            .map(|a| a.rebind(resolve))
            .collect::<PlanResult<Vec<_>>>()?;
        let mut rebound = Function::new(self.operator, arguments)?;
        if self.output_datatype != DataType::Unknown {
            let default = Function::new(self.operator, self.arguments.clone())?;
            if default.output_datatype != self.output_datatype {
                rebound.output_datatype = self.output_datatype;
            }
        }
        Ok(rebound)
    }
}

fn output_purpose(operator: FunctionType, arguments: &[Expr]) -> Purpose {
    if operator.is_aggregate() {
        return Purpose::Metric;
    }
    if operator == FunctionType::Constant {
        return Purpose::Constant;
    }
    let purposes: Vec<Purpose> = arguments.iter().filter_map(|a| a.purpose()).collect();
    if purposes.iter().all(|p| *p == Purpose::Constant) {
        Purpose::Constant
    } else if purposes.contains(&Purpose::Metric) {
        Purpose::Metric
    } else {
        Purpose::Property
    }
}

/// An aggregate evaluated at an explicit grain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateWrapper {
    pub function: Function,
    pub by: Vec<Concept>,
}

impl AggregateWrapper {
    pub fn new(function: Function, by: Vec<Concept>) -> Self {
        Self { function, by }
    }

    pub fn concept_arguments(&self) -> Vec<Concept> {
        let mut output = self.function.concept_arguments();
        output.extend(self.by.iter().cloned());
        output
    }

    pub fn with_namespace(&self, namespace: &str) -> Self {
        Self {
            function: self.function.with_namespace(namespace),
            by: self.by.iter().map(|c| c.with_namespace(namespace)).collect(),
        }
    }

    pub fn rebind(&self, resolve: &dyn Fn(&str) -> PlanResult<Concept>) -> PlanResult<Self> {
        Ok(Self {
            function: self.function.rebind(resolve)?,
            by: self
                .by
                .iter()
                .map(|c| c.rebind(resolve))
                .collect::<PlanResult<Vec<_>>>()?,
        })
    }
}
