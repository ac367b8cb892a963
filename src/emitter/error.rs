//! Rendering errors

use std::fmt;

use crate::plan::Aggregation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    /// A SELECT (outer or derived) with nothing in its select list
    EmptySelect,
    /// `IN` over an empty value list
    EmptyInList,
    /// Aggregate other than COUNT used without an argument
    MissingAggregateArgument(Aggregation),
}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitError::EmptySelect => write!(f, "SELECT requires at least one item"),
            EmitError::EmptyInList => write!(f, "IN requires at least one value"),
            EmitError::MissingAggregateArgument(func) => {
                write!(f, "{:?} requires an argument", func)
            }
        }
    }
}

impl std::error::Error for EmitError {}
