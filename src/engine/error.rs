//! Task execution errors

use std::fmt;

use super::task::{BoxError, TaskId};

#[derive(Debug)]
pub enum TaskError {
    /// A task with this id is already registered
    DuplicateTask(TaskId),
    /// No task with this id (never registered, finished or reclaimed)
    NotFound(TaskId),
    /// Another fetch on the same task is still running
    FetchInProgress(TaskId),
    /// The task was closed by cancellation, completion or reclamation
    Closed(TaskId),
    /// The batch did not complete within the fetch timeout
    Timeout(TaskId),
    /// Task creation, computation or row reading failed
    Execution { task: TaskId, source: BoxError },
    /// A worker panicked or was aborted unexpectedly
    Join { task: TaskId, message: String },
}

impl TaskError {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskError::DuplicateTask(id)
            | TaskError::NotFound(id)
            | TaskError::FetchInProgress(id)
            | TaskError::Closed(id)
            | TaskError::Timeout(id) => *id,
            TaskError::Execution { task, .. } | TaskError::Join { task, .. } => *task,
        }
    }

    /// Whether the failure left the task closed
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskError::Closed(_)
                | TaskError::Timeout(_)
                | TaskError::Execution { .. }
                | TaskError::Join { .. }
        )
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::DuplicateTask(id) => write!(f, "Task {} already exists", id),
            TaskError::NotFound(id) => write!(f, "Task {} not found", id),
            TaskError::FetchInProgress(id) => {
                write!(f, "Task {} is already being fetched", id)
            }
            TaskError::Closed(id) => write!(f, "Task {} is closed", id),
            TaskError::Timeout(id) => write!(f, "Fetch on task {} timed out", id),
            TaskError::Execution { task, source } => {
                write!(f, "Task {} failed: {}", task, source)
            }
            TaskError::Join { task, message } => {
                write!(f, "Worker for task {} did not complete: {}", task, message)
            }
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TaskError::Execution { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
