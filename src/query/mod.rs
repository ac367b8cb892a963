//! Structured query types (noun module)
//!
//! The source-agnostic query model: filters, groups, metrics, stats, sorts
//! and the metadata describing source fields.

mod field;
mod filter;
mod group;
mod metric;
mod request;
mod sort;

pub use field::{FieldCatalog, FieldFlag, FieldMetadata, FieldType, ParseFieldTypeError, TimePattern};
pub use filter::{flatten_filters, Filter, LeafFilter, LeafOp};
pub use group::{Granularity, Group};
pub use metric::{Metric, Stat, StatKind};
pub use request::{QueryKind, QueryRequest};
pub use sort::{AggSort, RawSort, Sort, SortDirection, SortTarget};
