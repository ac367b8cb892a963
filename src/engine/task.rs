//! Task interfaces and the values they exchange

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::plan::Value;
use crate::query::FieldType;

/// Boxed error raised by task implementations
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// One result row, in column order
pub type Row = Vec<Value>;

/// Name and type of a result column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self { name: name.into(), field_type }
    }
}

/// Forward-only row source
///
/// `next_row` may block; it is only ever called from the blocking pool.
pub trait Cursor: Send {
    fn metadata(&self) -> &[ColumnDescriptor];

    fn next_row(&mut self) -> Result<Option<Row>, BoxError>;

    /// More rows are available from another `compute` call once this cursor is drained
    fn has_next_batch(&self) -> bool {
        false
    }
}

/// A running computation
///
/// `compute` may be called again after a cursor reports `has_next_batch`.
pub trait ComputeTask: Send + Sync {
    fn compute(&self) -> Result<Box<dyn Cursor>, BoxError>;

    /// Completion estimate in [0, 1]
    fn progress(&self) -> f64;

    /// Best-effort interruption of in-flight work
    fn cancel(&self);

    /// Release resources; called exactly once
    fn close(&self) -> Result<(), BoxError>;
}

/// Creates the computation of a prepared task on its first fetch
pub trait TaskFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn ComputeTask>, BoxError>;

    /// Maximum rows per batch
    fn fetch_size(&self) -> usize;

    /// Query text, for logging
    fn raw_query(&self) -> &str;
}

/// A bounded slice of results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    pub rows: Vec<Row>,
    pub metadata: Vec<ColumnDescriptor>,
    /// Whether another fetch will return more rows
    pub has_next: bool,
}

/// Opaque task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Fresh random identifier
    pub fn new() -> Self {
        TaskId(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(TaskId)
    }
}

impl Serialize for TaskId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Lifecycle of a task holder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Registered, no computation started
    Prepared,
    /// Computation started by the first fetch
    Executed,
    /// Finished, cancelled, failed or reclaimed; resources released
    Closed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Prepared => write!(f, "prepared"),
            TaskState::Executed => write!(f, "executed"),
            TaskState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TaskStatus {
    pub progress: f64,
    pub state: TaskState,
}
