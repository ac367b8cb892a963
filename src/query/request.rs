use serde::Deserialize;

use super::filter::Filter;
use super::group::Group;
use super::metric::{Metric, Stat};
use super::sort::Sort;

/// Shape of a structured request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Plain row listing
    Raw,
    /// Grouped aggregation
    #[serde(alias = "aggregation")]
    Agg,
    /// Whole-field statistics
    Stats,
}

/// Request body for structured queries
///
/// Source-agnostic description of a query. Groups and metrics are addressed
/// by position from aggregate sorts.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct QueryRequest {
    /// Declared shape; checked against the populated clauses when present
    #[serde(rename = "type", default)]
    pub kind: Option<QueryKind>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub stats: Vec<Stat>,
    #[serde(default)]
    pub sorts: Vec<Sort>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    #[serde(default)]
    pub distinct: bool,
}
