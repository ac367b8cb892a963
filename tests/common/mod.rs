//! Shared test utilities for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use connectql::{
    compile_request, parser, BoxError, ColumnDescriptor, CompileError, CompileOptions, Connection,
    Connector, Cursor, FieldCatalog, FieldType, ParametrizedQuery, QueryRequest, Row, Source, Value,
};

/// Load the field catalog fixture from the tests/test_data directory
pub fn load_catalog() -> FieldCatalog {
    parser::parse_catalog_file("tests/test_data/catalog.yaml")
        .unwrap_or_else(|e| panic!("Failed to load catalog: {}", e))
}

/// Load a JSON request fixture from tests/test_data/requests
pub fn load_request(name: &str) -> QueryRequest {
    let path = format!("tests/test_data/requests/{}", name);
    parser::parse_request_file(&path)
        .unwrap_or_else(|e| panic!("Failed to load request {}: {}", name, e))
}

/// Compile a request against `sales.orders` with the fixture catalog
pub fn compile(request: &QueryRequest, options: &CompileOptions) -> Result<ParametrizedQuery, CompileError> {
    compile_request(request, orders(), &load_catalog(), options)
}

pub fn orders() -> Source {
    Source::table("sales", "orders")
}

/// Route engine logs to the test writer; `RUST_LOG=debug` shows them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn query() -> ParametrizedQuery {
    ParametrizedQuery::new("SELECT id, label FROM sales.orders", Vec::new())
}

// =============================================================================
// Fake database
// =============================================================================

/// Call counts observed by every connection of a [`FakeConnector`]
#[derive(Clone, Default)]
pub struct Counters {
    pub connects: Arc<AtomicUsize>,
    pub executes: Arc<AtomicUsize>,
    pub cancels: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl Counters {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// In-memory connector serving `rows` numbered rows per statement
#[derive(Clone)]
pub struct FakeConnector {
    rows: usize,
    /// Statements that produce rows before the cursor stops chaining
    segments: usize,
    execute_delay: Duration,
    fail: bool,
    pub counters: Counters,
}

impl FakeConnector {
    pub fn new(rows: usize) -> Self {
        Self {
            rows,
            segments: 1,
            execute_delay: Duration::ZERO,
            fail: false,
            counters: Counters::default(),
        }
    }

    /// Block every `execute` for `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = delay;
        self
    }

    /// Report `has_next_batch` until `segments` statements have run
    pub fn with_segments(mut self, segments: usize) -> Self {
        self.segments = segments;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Connector for FakeConnector {
    fn connect(&self) -> Result<Box<dyn Connection>, BoxError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            connector: self.clone(),
            executed: AtomicUsize::new(0),
        }))
    }
}

struct FakeConnection {
    connector: FakeConnector,
    executed: AtomicUsize,
}

impl Connection for FakeConnection {
    fn execute(&self, _query: &ParametrizedQuery, _fetch_size: usize) -> Result<Box<dyn Cursor>, BoxError> {
        let config = &self.connector;
        config.counters.executes.fetch_add(1, Ordering::SeqCst);
        if !config.execute_delay.is_zero() {
            std::thread::sleep(config.execute_delay);
        }
        if config.fail {
            return Err("connection reset by peer".into());
        }
        let segment = self.executed.fetch_add(1, Ordering::SeqCst);
        let first = segment * config.rows;
        Ok(Box::new(VecCursor::new(
            (first..first + config.rows).map(numbered_row).collect(),
            segment + 1 < config.segments,
        )))
    }

    fn cancel(&self) {
        self.connector.counters.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) -> Result<(), BoxError> {
        self.connector.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn numbered_row(i: usize) -> Row {
    vec![Value::Int(i as i64), Value::String(format!("row-{}", i))]
}

pub fn columns() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::new("id", FieldType::Integer),
        ColumnDescriptor::new("label", FieldType::String),
    ]
}

/// Cursor over pre-built rows
pub struct VecCursor {
    metadata: Vec<ColumnDescriptor>,
    rows: std::vec::IntoIter<Row>,
    has_next_batch: bool,
}

impl VecCursor {
    pub fn new(rows: Vec<Row>, has_next_batch: bool) -> Self {
        Self {
            metadata: columns(),
            rows: rows.into_iter(),
            has_next_batch,
        }
    }
}

impl Cursor for VecCursor {
    fn metadata(&self) -> &[ColumnDescriptor] {
        &self.metadata
    }

    fn next_row(&mut self) -> Result<Option<Row>, BoxError> {
        Ok(self.rows.next())
    }

    fn has_next_batch(&self) -> bool {
        self.has_next_batch
    }
}
