//! connectql - Compile structured queries to parameterized SQL and serve the
//! results as paginated, cancellable batches
//!
//! This library provides:
//! - Query request types (filters, groups, metrics, stats, sorts) and field metadata
//! - Compilation of requests into dialect-specific SQL with `?` parameters
//! - A task registry that executes compiled queries and streams bounded batches
//! - Configuration, catalog and request parsing
//!
//! # Architecture
//!
//! **Noun modules** (data structures):
//! - `query/` - request types (Filter, Group, Metric, Stat, Sort) and FieldCatalog
//! - `plan/` - dialect-neutral SELECT tree (Select, Relation, Expr) and ParametrizedQuery
//! - `dialect/` - per-database rendering rules
//! - `config` - RuntimeConfig
//!
//! **Verb modules** (transformations):
//! - `parser/` - YAML → RuntimeConfig / FieldCatalog, JSON → QueryRequest
//! - `compiler/` - QuerySpec → Select → ParametrizedQuery
//! - `emitter/` - Select → SQL text + bind values
//! - `engine/` - ParametrizedQuery → tasks → Batches
//!
//! # Example
//!
//! ```ignore
//! use connectql::{parser, CompileOptions, Source, TaskRegistry};
//!
//! let config = parser::parse_config_file("connectql.yaml")?;
//! let catalog = parser::parse_catalog_file("fields.yaml")?;
//! let request = parser::parse_request_str(body)?;
//!
//! let query = request
//!     .into_builder(Source::table("sales", "orders"), catalog)
//!     .build()?
//!     .compile(&config.compiler)?;
//!
//! let registry = TaskRegistry::start(config.engine, connector);
//! let id = registry.prepare(query, None);
//! let batch = registry.fetch_next(id).await?;
//! ```

pub mod query;
pub mod plan;
pub mod dialect;
pub mod compiler;
pub mod emitter;
pub mod engine;
pub mod parser;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use query::{
    flatten_filters, FieldCatalog, FieldFlag, FieldMetadata, FieldType, Filter, Granularity, Group,
    LeafOp, Metric, QueryKind, QueryRequest, Sort, SortDirection, Stat, StatKind, TimePattern,
};
pub use plan::{ParametrizedQuery, Value};
pub use dialect::Dialect;
pub use compiler::{compile_request, CompileError, CompileOptions, QueryBuilder, QuerySpec, Source};
pub use emitter::{emit_sql, EmitError};
pub use engine::{
    Batch, BoxError, ColumnDescriptor, ComputeTask, Connection, Connector, Cursor, Row, TaskError,
    TaskFactory, TaskId, TaskRegistry, TaskState, TaskStatus,
};
pub use config::{EngineConfig, RuntimeConfig};
pub use error::ParseError;
