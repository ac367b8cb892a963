//! Task registry: id → holder map plus the idle-task reaper

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::error::TaskError;
use super::holder::TaskHolder;
use super::sql::{Connector, SqlTaskFactory};
use super::task::{Batch, TaskFactory, TaskId, TaskStatus};
use crate::config::EngineConfig;
use crate::plan::ParametrizedQuery;

struct Shared {
    config: EngineConfig,
    connector: Arc<dyn Connector>,
    tasks: RwLock<HashMap<TaskId, Arc<TaskHolder>>>,
}

impl Shared {
    fn get(&self, id: TaskId) -> Option<Arc<TaskHolder>> {
        self.tasks.read().get(&id).cloned()
    }

    fn sweep(&self) -> usize {
        let holders: Vec<Arc<TaskHolder>> = self.tasks.read().values().cloned().collect();
        let lost: Vec<Arc<TaskHolder>> = holders
            .into_iter()
            .filter(|holder| holder.check_lost_and_close())
            .collect();

        let live = {
            let mut tasks = self.tasks.write();
            for holder in &lost {
                remove_if_current(&mut tasks, holder);
            }
            tasks.len()
        };
        info!(live, reclaimed = lost.len(), "registry: sweep complete");
        lost.len()
    }
}

// the id may have been re-registered since `holder` was looked up
fn remove_if_current(tasks: &mut HashMap<TaskId, Arc<TaskHolder>>, holder: &Arc<TaskHolder>) {
    if tasks.get(&holder.id()).is_some_and(|current| Arc::ptr_eq(current, holder)) {
        tasks.remove(&holder.id());
    }
}

/// Holds every prepared task and serves fetch, cancel and status calls
///
/// Must be started inside a tokio runtime. Dropping the registry stops the
/// reaper; [`TaskRegistry::shutdown`] additionally cancels all tasks.
pub struct TaskRegistry {
    shared: Arc<Shared>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl TaskRegistry {
    pub fn start(config: EngineConfig, connector: Arc<dyn Connector>) -> Self {
        let period = config.reaper_interval();
        let shared = Arc::new(Shared {
            config,
            connector,
            tasks: RwLock::new(HashMap::new()),
        });
        let reaper = tokio::spawn(run_reaper(Arc::downgrade(&shared), period));
        info!(reaper_interval_ms = period.as_millis() as u64, "registry: started");
        Self {
            shared,
            reaper: Mutex::new(Some(reaper)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Register a task under a caller-chosen id
    pub fn put(&self, id: TaskId, factory: Arc<dyn TaskFactory>) -> Result<(), TaskError> {
        let mut tasks = self.shared.tasks.write();
        if tasks.contains_key(&id) {
            return Err(TaskError::DuplicateTask(id));
        }
        let holder = TaskHolder::new(id, factory, self.shared.config.idle_timeout());
        debug!(task_id = %id, query = holder.raw_query(), "registry: task prepared");
        tasks.insert(id, Arc::new(holder));
        Ok(())
    }

    /// Register a compiled query under a fresh id; `None` uses the configured batch size
    pub fn prepare(&self, query: ParametrizedQuery, fetch_size: Option<usize>) -> TaskId {
        let fetch_size = fetch_size.unwrap_or(self.shared.config.default_fetch_size);
        let factory = Arc::new(SqlTaskFactory::new(self.shared.connector.clone(), query, fetch_size));
        loop {
            let id = TaskId::new();
            if self.put(id, factory.clone()).is_ok() {
                return id;
            }
        }
    }

    /// Fetch the next batch of a task
    ///
    /// The task is dropped from the registry once its results are exhausted
    /// or the fetch left it closed.
    pub async fn fetch(&self, id: TaskId, timeout: Duration) -> Result<Batch, TaskError> {
        let holder = self.shared.get(id).ok_or(TaskError::NotFound(id))?;
        let result = holder.fetch(timeout).await;
        let finished = match &result {
            Ok(batch) => !batch.has_next,
            Err(err) => err.is_terminal(),
        };
        if finished {
            self.remove_holder(&holder);
        }
        result
    }

    /// Fetch with the configured default timeout
    pub async fn fetch_next(&self, id: TaskId) -> Result<Batch, TaskError> {
        self.fetch(id, self.shared.config.default_fetch_timeout()).await
    }

    /// Cancel and forget a task; unknown ids are ignored
    pub fn cancel(&self, id: TaskId) {
        let holder = self.shared.tasks.write().remove(&id);
        if let Some(holder) = holder {
            holder.cancel();
        }
    }

    pub fn progress(&self, id: TaskId) -> Option<f64> {
        self.shared.get(id).map(|holder| holder.progress())
    }

    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.shared.get(id).map(|holder| TaskStatus {
            progress: holder.progress(),
            state: holder.state(),
        })
    }

    /// Run one reaper pass now; returns the number of tasks removed
    pub fn sweep(&self) -> usize {
        self.shared.sweep()
    }

    pub fn len(&self) -> usize {
        self.shared.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the reaper and cancel every task
    pub fn shutdown(&self) {
        if let Some(reaper) = self.reaper.lock().take() {
            reaper.abort();
        }
        let holders: Vec<Arc<TaskHolder>> = self.shared.tasks.write().drain().map(|(_, h)| h).collect();
        for holder in &holders {
            holder.cancel();
        }
        info!(cancelled = holders.len(), "registry: shut down");
    }

    fn remove_holder(&self, holder: &Arc<TaskHolder>) {
        remove_if_current(&mut self.shared.tasks.write(), holder);
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        if let Some(reaper) = self.reaper.lock().take() {
            reaper.abort();
        }
    }
}

async fn run_reaper(shared: Weak<Shared>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match shared.upgrade() {
            Some(shared) => {
                shared.sweep();
            }
            None => break,
        }
    }
}
