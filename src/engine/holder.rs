//! Task holder: lifecycle and batch fetching for one task
//!
//! Two locks guard a holder. The fetch lock (async, held across the batch
//! wait) serializes fetches; a second fetch fails fast instead of queueing.
//! The state lock (sync, never held across an await) guards the lifecycle.
//! Lock order is fetch lock, then state lock; paths holding the state lock
//! only ever `try_lock` the fetch lock.

use parking_lot::Mutex;
use std::mem;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::error::TaskError;
use super::task::{Batch, BoxError, ComputeTask, Cursor, Row, TaskFactory, TaskId, TaskState};

/// Idle time after which an unfetched task is reclaimed
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

type ComputeHandle = JoinHandle<Result<Box<dyn Cursor>, BoxError>>;
type BatchHandle = JoinHandle<Result<BatchOutcome, BoxError>>;

/// Cursor with one row of lookahead, used to report `has_next` exactly
struct PeekableCursor {
    inner: Box<dyn Cursor>,
    peeked: Option<Row>,
}

impl PeekableCursor {
    fn new(inner: Box<dyn Cursor>) -> Self {
        Self { inner, peeked: None }
    }

    fn next_row(&mut self) -> Result<Option<Row>, BoxError> {
        match self.peeked.take() {
            Some(row) => Ok(Some(row)),
            None => self.inner.next_row(),
        }
    }

    fn has_more(&mut self) -> Result<bool, BoxError> {
        if self.peeked.is_none() {
            self.peeked = self.inner.next_row()?;
        }
        Ok(self.peeked.is_some())
    }

    fn read(&mut self, limit: usize) -> Result<Vec<Row>, BoxError> {
        let mut rows = Vec::with_capacity(limit.min(1024));
        while rows.len() < limit {
            match self.next_row()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }
}

/// Where the next batch is read from
enum RowSource {
    /// `compute` still running on the blocking pool
    Computing(ComputeHandle),
    /// Open cursor with rows left
    Open(PeekableCursor),
}

struct Execution {
    task: Arc<dyn ComputeTask>,
    /// Taken by the running batch job, put back when it completes
    source: Option<RowSource>,
    batch_job: Option<AbortHandle>,
    /// Batch job left running by a fetch that was dropped before it completed
    pending: Option<BatchHandle>,
}

enum Lifecycle {
    Prepared,
    Executed(Execution),
    Closed,
}

struct HolderState {
    lifecycle: Lifecycle,
    last_touched: Instant,
}

struct BatchOutcome {
    batch: Batch,
    next: Option<RowSource>,
}

/// Owns one prepared task and serves its results batch by batch
pub struct TaskHolder {
    id: TaskId,
    factory: Arc<dyn TaskFactory>,
    idle_timeout: Duration,
    fetch_lock: tokio::sync::Mutex<()>,
    state: Mutex<HolderState>,
}

impl TaskHolder {
    pub fn new(id: TaskId, factory: Arc<dyn TaskFactory>, idle_timeout: Duration) -> Self {
        Self {
            id,
            factory,
            idle_timeout,
            fetch_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(HolderState {
                lifecycle: Lifecycle::Prepared,
                last_touched: Instant::now(),
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn raw_query(&self) -> &str {
        self.factory.raw_query()
    }

    pub fn state(&self) -> TaskState {
        match self.state.lock().lifecycle {
            Lifecycle::Prepared => TaskState::Prepared,
            Lifecycle::Executed(_) => TaskState::Executed,
            Lifecycle::Closed => TaskState::Closed,
        }
    }

    /// Task-reported progress once executing, 0.0 otherwise
    pub fn progress(&self) -> f64 {
        let task = match &self.state.lock().lifecycle {
            Lifecycle::Executed(execution) => Some(execution.task.clone()),
            Lifecycle::Prepared | Lifecycle::Closed => None,
        };
        task.map(|t| t.progress().clamp(0.0, 1.0)).unwrap_or(0.0)
    }

    /// Fetch the next batch, waiting at most `timeout`
    ///
    /// The first fetch starts the computation. The task is closed when the
    /// results are exhausted, on timeout and on failure.
    pub async fn fetch(&self, timeout: Duration) -> Result<Batch, TaskError> {
        let _fetch_guard = self
            .fetch_lock
            .try_lock()
            .map_err(|_| TaskError::FetchInProgress(self.id))?;
        let result = self.fetch_locked(timeout).await;
        self.state.lock().last_touched = Instant::now();
        result
    }

    async fn fetch_locked(&self, timeout: Duration) -> Result<Batch, TaskError> {
        let mut waiting = WaitingBatch { holder: self, job: Some(self.start_batch()?) };
        let waited = match waiting.job.as_mut() {
            Some(job) => tokio::time::timeout(timeout, job).await,
            None => return Err(TaskError::Closed(self.id)),
        };
        let job = waiting.job.take();
        match waited {
            Err(_) => {
                if let Some(job) = job {
                    job.abort();
                }
                warn!(
                    task_id = %self.id,
                    timeout_ms = timeout.as_millis() as u64,
                    "task: fetch timed out"
                );
                self.close(true);
                Err(TaskError::Timeout(self.id))
            }
            // aborted by a concurrent cancel, which already closed the task
            Ok(Err(err)) if err.is_cancelled() => Err(TaskError::Closed(self.id)),
            Ok(Err(err)) => {
                warn!(task_id = %self.id, error = %err, "task: batch worker failed");
                self.close(true);
                Err(TaskError::Join { task: self.id, message: err.to_string() })
            }
            Ok(Ok(Err(source))) => {
                warn!(task_id = %self.id, error = %source, "task: execution failed");
                self.close(true);
                Err(TaskError::Execution { task: self.id, source })
            }
            Ok(Ok(Ok(outcome))) => self.finish_batch(outcome),
        }
    }

    fn start_batch(&self) -> Result<BatchHandle, TaskError> {
        let mut state = self.state.lock();
        state.last_touched = Instant::now();

        if matches!(state.lifecycle, Lifecycle::Prepared) {
            let task = match self.factory.create() {
                Ok(task) => task,
                Err(source) => {
                    state.lifecycle = Lifecycle::Closed;
                    warn!(task_id = %self.id, error = %source, "task: creation failed");
                    return Err(TaskError::Execution { task: self.id, source });
                }
            };
            debug!(task_id = %self.id, query = self.factory.raw_query(), "task: executing");
            let compute = spawn_compute(task.clone());
            state.lifecycle = Lifecycle::Executed(Execution {
                task,
                source: Some(RowSource::Computing(compute)),
                batch_job: None,
                pending: None,
            });
        }

        let Lifecycle::Executed(execution) = &mut state.lifecycle else {
            return Err(TaskError::Closed(self.id));
        };
        if let Some(job) = execution.pending.take() {
            debug!(task_id = %self.id, "task: resuming abandoned batch");
            return Ok(job);
        }
        let source = execution.source.take().ok_or(TaskError::Closed(self.id))?;
        let job = tokio::spawn(read_batch(
            execution.task.clone(),
            source,
            self.factory.fetch_size().max(1),
        ));
        execution.batch_job = Some(job.abort_handle());
        Ok(job)
    }

    fn finish_batch(&self, outcome: BatchOutcome) -> Result<Batch, TaskError> {
        let mut state = self.state.lock();
        match &mut state.lifecycle {
            Lifecycle::Executed(execution) => {
                execution.batch_job = None;
                if let Some(next) = outcome.next {
                    execution.source = Some(next);
                    return Ok(outcome.batch);
                }
            }
            // cancelled after the batch was read
            Lifecycle::Prepared | Lifecycle::Closed => return Err(TaskError::Closed(self.id)),
        }
        drop(state);

        debug!(task_id = %self.id, "task: results exhausted");
        self.close(false);
        Ok(outcome.batch)
    }

    /// Keep a running batch job for the next fetch; aborted if the task closed meanwhile
    fn park_batch(&self, job: BatchHandle) {
        let mut state = self.state.lock();
        match &mut state.lifecycle {
            Lifecycle::Executed(execution) => execution.pending = Some(job),
            Lifecycle::Prepared | Lifecycle::Closed => job.abort(),
        }
    }

    /// Cancel in-flight work and close. No-op once closed.
    pub fn cancel(&self) {
        if self.close(true) {
            debug!(task_id = %self.id, "task: cancelled");
        }
    }

    /// Reclaim the task if it has been idle past the timeout
    ///
    /// Never blocks: returns false when either lock is busy. A holder that
    /// is already closed reports true so the registry can drop it.
    pub fn check_lost_and_close(&self) -> bool {
        let Some(mut state) = self.state.try_lock() else {
            return false;
        };
        if matches!(state.lifecycle, Lifecycle::Closed) {
            return true;
        }
        let Ok(_fetch_guard) = self.fetch_lock.try_lock() else {
            return false;
        };
        let idle = state.last_touched.elapsed();
        if idle < self.idle_timeout {
            return false;
        }

        let previous = mem::replace(&mut state.lifecycle, Lifecycle::Closed);
        drop(state);
        if let Lifecycle::Executed(execution) = previous {
            self.release(execution, true);
        }
        info!(task_id = %self.id, idle_ms = idle.as_millis() as u64, "task: reclaimed idle task");
        true
    }

    /// Move to Closed; returns whether this call performed the transition
    fn close(&self, cancel: bool) -> bool {
        let previous = {
            let mut state = self.state.lock();
            if matches!(state.lifecycle, Lifecycle::Closed) {
                return false;
            }
            mem::replace(&mut state.lifecycle, Lifecycle::Closed)
        };
        if let Lifecycle::Executed(execution) = previous {
            self.release(execution, cancel);
        }
        true
    }

    fn release(&self, execution: Execution, cancel: bool) {
        if let Some(job) = &execution.batch_job {
            job.abort();
        }
        if let Some(job) = &execution.pending {
            job.abort();
        }
        if cancel {
            execution.task.cancel();
        }
        drop(execution.source);
        if let Err(err) = execution.task.close() {
            warn!(task_id = %self.id, error = %err, "task: close failed");
        }
    }
}

impl Drop for TaskHolder {
    fn drop(&mut self) {
        self.close(true);
    }
}

/// Batch job awaited by a fetch; parked on the holder if the fetch is dropped
struct WaitingBatch<'a> {
    holder: &'a TaskHolder,
    job: Option<BatchHandle>,
}

impl Drop for WaitingBatch<'_> {
    fn drop(&mut self) {
        if let Some(job) = self.job.take() {
            self.holder.park_batch(job);
        }
    }
}

fn spawn_compute(task: Arc<dyn ComputeTask>) -> ComputeHandle {
    tokio::task::spawn_blocking(move || task.compute())
}

/// Read one batch, then decide where the next one comes from
async fn read_batch(
    task: Arc<dyn ComputeTask>,
    source: RowSource,
    fetch_size: usize,
) -> Result<BatchOutcome, BoxError> {
    let cursor = match source {
        RowSource::Open(cursor) => cursor,
        RowSource::Computing(compute) => PeekableCursor::new(compute.await??),
    };

    let (cursor, rows, has_more) = tokio::task::spawn_blocking(move || {
        let mut cursor = cursor;
        let rows = cursor.read(fetch_size)?;
        let has_more = cursor.has_more()?;
        Ok::<_, BoxError>((cursor, rows, has_more))
    })
    .await??;

    let metadata = cursor.inner.metadata().to_vec();
    let next = if has_more {
        Some(RowSource::Open(cursor))
    } else if cursor.inner.has_next_batch() {
        Some(RowSource::Computing(spawn_compute(task)))
    } else {
        None
    };

    Ok(BatchOutcome {
        batch: Batch { rows, metadata, has_next: next.is_some() },
        next,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::task::ColumnDescriptor;
    use crate::plan::Value;
    use crate::query::FieldType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct VecCursor {
        metadata: Vec<ColumnDescriptor>,
        rows: std::vec::IntoIter<Row>,
    }

    impl Cursor for VecCursor {
        fn metadata(&self) -> &[ColumnDescriptor] {
            &self.metadata
        }

        fn next_row(&mut self) -> Result<Option<Row>, BoxError> {
            Ok(self.rows.next())
        }
    }

    #[derive(Default)]
    struct CountingTask {
        rows: usize,
        closes: AtomicUsize,
        cancels: AtomicUsize,
    }

    impl ComputeTask for CountingTask {
        fn compute(&self) -> Result<Box<dyn Cursor>, BoxError> {
            let rows: Vec<Row> = (0..self.rows as i64).map(|i| vec![Value::Int(i)]).collect();
            Ok(Box::new(VecCursor {
                metadata: vec![ColumnDescriptor::new("n", FieldType::Integer)],
                rows: rows.into_iter(),
            }))
        }

        fn progress(&self) -> f64 {
            0.5
        }

        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }

        fn close(&self) -> Result<(), BoxError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Factory {
        task: Arc<CountingTask>,
        fetch_size: usize,
    }

    impl TaskFactory for Factory {
        fn create(&self) -> Result<Arc<dyn ComputeTask>, BoxError> {
            Ok(self.task.clone())
        }

        fn fetch_size(&self) -> usize {
            self.fetch_size
        }

        fn raw_query(&self) -> &str {
            "SELECT n FROM numbers"
        }
    }

    fn holder(rows: usize, fetch_size: usize, idle: Duration) -> (TaskHolder, Arc<CountingTask>) {
        let task = Arc::new(CountingTask { rows, ..Default::default() });
        let factory = Arc::new(Factory { task: task.clone(), fetch_size });
        (TaskHolder::new(TaskId::new(), factory, idle), task)
    }

    #[tokio::test]
    async fn test_exact_multiple_reports_no_trailing_batch() {
        let (holder, task) = holder(4, 2, DEFAULT_IDLE_TIMEOUT);
        assert_eq!(holder.state(), TaskState::Prepared);
        assert_eq!(holder.progress(), 0.0);

        let first = holder.fetch(Duration::from_secs(5)).await.unwrap();
        assert_eq!(first.rows.len(), 2);
        assert!(first.has_next);
        assert_eq!(holder.state(), TaskState::Executed);
        assert_eq!(holder.progress(), 0.5);

        let second = holder.fetch(Duration::from_secs(5)).await.unwrap();
        assert_eq!(second.rows, vec![vec![Value::Int(2)], vec![Value::Int(3)]]);
        assert!(!second.has_next);
        assert_eq!(holder.state(), TaskState::Closed);
        assert_eq!(task.closes.load(Ordering::SeqCst), 1);
        assert_eq!(task.cancels.load(Ordering::SeqCst), 0);

        assert!(matches!(
            holder.fetch(Duration::from_secs(5)).await,
            Err(TaskError::Closed(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_closes_once() {
        let (holder, task) = holder(10, 3, DEFAULT_IDLE_TIMEOUT);
        holder.fetch(Duration::from_secs(5)).await.unwrap();
        holder.cancel();
        holder.cancel();
        drop(holder);
        assert_eq!(task.closes.load(Ordering::SeqCst), 1);
        assert_eq!(task.cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_execution_never_creates_task() {
        let (holder, task) = holder(10, 3, DEFAULT_IDLE_TIMEOUT);
        holder.cancel();
        assert_eq!(holder.state(), TaskState::Closed);
        assert_eq!(task.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_idle_holder_reclaimed() {
        let (holder, task) = holder(10, 3, Duration::from_millis(20));
        holder.fetch(Duration::from_secs(5)).await.unwrap();
        assert!(!holder.check_lost_and_close());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(holder.check_lost_and_close());
        assert_eq!(holder.state(), TaskState::Closed);
        assert!(holder.check_lost_and_close());
        assert_eq!(task.closes.load(Ordering::SeqCst), 1);
        assert_eq!(task.cancels.load(Ordering::SeqCst), 1);
    }
}
