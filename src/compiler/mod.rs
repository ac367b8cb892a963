//! Structured query compilation (verb module)
//!
//! Turns a [`QuerySpec`] into a dialect-specific [`ParametrizedQuery`]:
//! - filters become a WHERE predicate with bound `?` parameters
//! - groups become GROUP BY keys (attributes, truncated time, histogram buckets)
//! - metrics become aggregates, with a shared left join per last-value time
//!   field and a window-function derived table for percentiles
//! - stats become whole-field aggregates

mod alias;
mod builder;
mod error;
mod filter;
mod group;
mod metric;
mod sort;
mod stats;

use serde::Deserialize;

use crate::dialect::Dialect;
use crate::plan::ParametrizedQuery;
use crate::query::{FieldCatalog, QueryRequest};

pub use alias::{AliasGenerator, DEFAULT_MAX_ALIAS_LENGTH};
pub use builder::{QueryBuilder, QuerySpec, Source};
pub use error::CompileError;
pub use group::histogram_points;

/// Settings applied to every compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub dialect: Dialect,
    pub max_alias_length: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            max_alias_length: DEFAULT_MAX_ALIAS_LENGTH,
        }
    }
}

impl CompileOptions {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect, ..Default::default() }
    }
}

/// Read-only inputs shared by the clause processors
pub(crate) struct Context<'a> {
    pub catalog: &'a FieldCatalog,
    pub dialect: Dialect,
}

/// Validate and compile a deserialized request in one step
pub fn compile_request(
    request: &QueryRequest,
    source: Source,
    catalog: &FieldCatalog,
    options: &CompileOptions,
) -> Result<ParametrizedQuery, CompileError> {
    request
        .clone()
        .into_builder(source, catalog.clone())
        .build()?
        .compile(options)
}
