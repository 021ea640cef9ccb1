//! Calendar properties derived from temporal concepts.
//!
//! ```text
//!   order_date (date)          ──▶ order_date.month, .year, .quarter, .day, .day_of_week
//!   created_at (timestamp)     ──▶ the above + created_at.date, .hour, .minute, .second
//! ```

use crate::error::PlanResult;
use crate::model::{
    Concept, DataType, Expr, Function, FunctionType, Lineage, Metadata, Purpose,
};

const DATE_PARTS: [FunctionType; 5] = [
    FunctionType::Month,
    FunctionType::Year,
    FunctionType::Quarter,
    FunctionType::Day,
    FunctionType::DayOfWeek,
];

const TIME_PARTS: [FunctionType; 4] = [
    FunctionType::Date,
    FunctionType::Hour,
    FunctionType::Minute,
    FunctionType::Second,
];

/// Operators applicable to a concept of the given type.
fn parts_for(datatype: DataType) -> Vec<FunctionType> {
    match datatype {
        DataType::Date => DATE_PARTS.to_vec(),
        DataType::Datetime | DataType::Timestamp => {
            DATE_PARTS.iter().chain(TIME_PARTS.iter()).copied().collect()
        }
        _ => Vec::new(),
    }
}

/// Derived properties for a temporal concept, keyed by it.
pub fn derive_date_parts(concept: &Concept) -> PlanResult<Vec<Concept>> {
    let base_description = concept
        .metadata
        .description
        .clone()
        .unwrap_or_else(|| format!("a {}", concept.datatype));
    let purpose = if concept.purpose == Purpose::Constant {
        Purpose::Constant
    } else {
        Purpose::Property
    };

    parts_for(concept.datatype)
        .into_iter()
        .map(|operator| {
            let function = Function::new(operator, vec![Expr::from(concept)])?
                .with_output_purpose(purpose);
            let description = format!(
                "Auto-derived. The {} derived from {}, {}",
                operator, concept.name, base_description
            );
            let derived = Concept::derived(
                format!("{}.{}", concept.name, operator),
                purpose,
                Lineage::Function(function),
            )
            .in_namespace(&concept.namespace)
            .with_keys(vec![concept.clone()])
            .with_metadata(Metadata::auto_derived(description));
            Ok(derived)
        })
        .collect()
}
