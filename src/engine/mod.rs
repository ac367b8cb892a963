//! Task execution engine
//!
//! Prepared queries are registered as tasks and their results are pulled in
//! bounded batches. Blocking work (statement execution, cursor reads) runs
//! on tokio's blocking pool; a periodic reaper reclaims abandoned tasks.

mod error;
mod holder;
mod registry;
mod sql;
mod task;

pub use error::TaskError;
pub use holder::{TaskHolder, DEFAULT_IDLE_TIMEOUT};
pub use registry::TaskRegistry;
pub use sql::{Connection, Connector, SqlComputeTask, SqlTaskFactory};
pub use task::{
    Batch, BoxError, ColumnDescriptor, ComputeTask, Cursor, Row, TaskFactory, TaskId, TaskState,
    TaskStatus,
};
