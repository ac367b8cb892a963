//! Tasks that run a compiled query on a database connection

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::task::{BoxError, ComputeTask, Cursor, TaskFactory};
use crate::plan::ParametrizedQuery;

/// Opens connections to the target database; pooling is up to the implementor
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Connection>, BoxError>;
}

/// A database session able to run one statement at a time
pub trait Connection: Send + Sync {
    /// Execute with the given row-prefetch hint and return a cursor over the results
    fn execute(&self, query: &ParametrizedQuery, fetch_size: usize) -> Result<Box<dyn Cursor>, BoxError>;

    /// Interrupt the running statement, if any
    fn cancel(&self);

    fn close(&self) -> Result<(), BoxError>;
}

/// Creates a [`SqlComputeTask`] for a compiled query
pub struct SqlTaskFactory {
    connector: Arc<dyn Connector>,
    query: ParametrizedQuery,
    fetch_size: usize,
}

impl SqlTaskFactory {
    pub fn new(connector: Arc<dyn Connector>, query: ParametrizedQuery, fetch_size: usize) -> Self {
        Self { connector, query, fetch_size }
    }
}

impl TaskFactory for SqlTaskFactory {
    fn create(&self) -> Result<Arc<dyn ComputeTask>, BoxError> {
        Ok(Arc::new(SqlComputeTask {
            connector: self.connector.clone(),
            query: self.query.clone(),
            fetch_size: self.fetch_size,
            connection: Mutex::new(None),
            opened: AtomicBool::new(false),
        }))
    }

    fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    fn raw_query(&self) -> &str {
        self.query.sql()
    }
}

/// Runs the query on a lazily opened connection
///
/// Progress is 0 until the first cursor is open, then 1.
pub struct SqlComputeTask {
    connector: Arc<dyn Connector>,
    query: ParametrizedQuery,
    fetch_size: usize,
    connection: Mutex<Option<Arc<dyn Connection>>>,
    opened: AtomicBool,
}

impl SqlComputeTask {
    fn connection(&self) -> Result<Arc<dyn Connection>, BoxError> {
        let mut slot = self.connection.lock();
        if let Some(connection) = slot.as_ref() {
            return Ok(connection.clone());
        }
        let connection: Arc<dyn Connection> = Arc::from(self.connector.connect()?);
        *slot = Some(connection.clone());
        Ok(connection)
    }
}

impl ComputeTask for SqlComputeTask {
    fn compute(&self) -> Result<Box<dyn Cursor>, BoxError> {
        let connection = self.connection()?;
        let cursor = connection.execute(&self.query, self.fetch_size)?;
        self.opened.store(true, Ordering::SeqCst);
        Ok(cursor)
    }

    fn progress(&self) -> f64 {
        if self.opened.load(Ordering::SeqCst) {
            1.0
        } else {
            0.0
        }
    }

    fn cancel(&self) {
        let connection = self.connection.lock().clone();
        if let Some(connection) = connection {
            connection.cancel();
        }
    }

    fn close(&self) -> Result<(), BoxError> {
        let connection = self.connection.lock().take();
        match connection {
            Some(connection) => connection.close(),
            None => Ok(()),
        }
    }
}
