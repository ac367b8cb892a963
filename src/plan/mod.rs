//! Logical plan types (noun module)
//!
//! A dialect-neutral SELECT tree produced by the compiler and rendered by the emitter.

mod expr;
mod node;
mod value;

use serde::Serialize;

pub use expr::{Aggregation, BinaryOperator, Column, Expr, Literal, SortKey, TableRef, WindowFunction};
pub use node::{Join, JoinType, Relation, Select, SelectItem};
pub use value::Value;

/// Compiled SQL text plus its positional bind values
///
/// Immutable once built; safe to execute repeatedly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParametrizedQuery {
    sql: String,
    params: Vec<Value>,
}

impl ParametrizedQuery {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self { sql: sql.into(), params }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}
