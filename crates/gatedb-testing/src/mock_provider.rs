//! Scriptable in-memory pool provider.
//!
//! [`MockProvider`] implements the gatedb provider traits without a database.
//! Responses are configured per statement, failures can be injected at every
//! step (pool creation, connection acquisition, connection close, pool
//! close), and every call is recorded so tests can assert on exactly what
//! reached the "driver".
//!
//! ## Example
//!
//! ```rust,ignore
//! use gatedb_testing::mock_provider::{MockProvider, MockResponse};
//!
//! let provider = MockProvider::builder()
//!     .with_response("SELECT 1 FROM DUAL", MockResponse::rows(["1"], vec![vec![1.into()]]))
//!     .with_pool_failure("B", DriverError::with_code(12541, "no listener"))
//!     .build();
//!
//! let db = Database::builder().shared_provider(provider.shared()).pool(...).build()?;
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gatedb::{
    BatchError, BatchResult, Binds, Column, CommandKind, Connection, DriverError, ExecuteOptions,
    OutputFormat, PoolConfig, PoolHandle, PoolProvider, ResultSet, Row,
};
use parking_lot::Mutex;
use serde_json::{Map, Value};

/// Scripted response for a statement.
#[derive(Clone)]
pub enum MockResponse {
    /// Return rows. Shaped as objects or arrays according to the call's
    /// [`OutputFormat`].
    Rows {
        /// Column names.
        columns: Vec<String>,
        /// Row values in column order.
        rows: Vec<Vec<Value>>,
    },

    /// Return a DML row count. For batches, the total across bind sets.
    RowsAffected(u64),

    /// Fail the whole call.
    Error(DriverError),

    /// Batch only: fail the listed bind sets.
    ///
    /// With `batch_errors` enabled the failures are returned inside the
    /// result and the other bind sets count one row each. Without it the
    /// batch aborts with the first failure, as a driver would.
    BatchErrors(Vec<BatchError>),

    /// Compute the response from the recorded call.
    Custom(Arc<dyn Fn(&ExecutedCall) -> MockResponse + Send + Sync>),
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows { columns, rows } => f
                .debug_struct("Rows")
                .field("columns", columns)
                .field("rows", rows)
                .finish(),
            Self::RowsAffected(n) => f.debug_tuple("RowsAffected").field(n).finish(),
            Self::Error(err) => f.debug_tuple("Error").field(err).finish(),
            Self::BatchErrors(errors) => f.debug_tuple("BatchErrors").field(errors).finish(),
            Self::Custom(_) => f.debug_tuple("Custom").field(&"<fn>").finish(),
        }
    }
}

impl MockResponse {
    /// Create a row response.
    pub fn rows<I, S>(columns: I, rows: Vec<Vec<Value>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Rows {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    /// Create a single-column, single-row response.
    pub fn scalar(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Rows {
            columns: vec![column.into()],
            rows: vec![vec![value.into()]],
        }
    }

    /// Create an empty result response.
    pub fn empty() -> Self {
        Self::RowsAffected(0)
    }

    /// Create a rows affected response.
    pub fn affected(count: u64) -> Self {
        Self::RowsAffected(count)
    }

    /// Create an error response.
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self::Error(DriverError::with_code(code, message))
    }

    /// Create a partial batch failure response.
    pub fn batch_errors(errors: Vec<BatchError>) -> Self {
        Self::BatchErrors(errors)
    }

    /// Create a response computed per call.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&ExecutedCall) -> MockResponse + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    fn resolve(&self, call: &ExecutedCall) -> MockResponse {
        match self {
            Self::Custom(f) => f(call).resolve(call),
            other => other.clone(),
        }
    }

    fn into_result_set(self, format: OutputFormat) -> Result<ResultSet, DriverError> {
        match self {
            Self::Rows { columns, rows } => {
                let shaped = rows
                    .into_iter()
                    .map(|values| shape_row(&columns, values, format))
                    .collect();
                Ok(ResultSet::new(
                    columns.into_iter().map(Column::new).collect(),
                    shaped,
                ))
            }
            Self::RowsAffected(n) => Ok(ResultSet::affected(n)),
            Self::Error(err) => Err(err),
            Self::BatchErrors(_) | Self::Custom(_) => Ok(ResultSet::affected(0)),
        }
    }

    fn into_batch_result(
        self,
        bind_sets: usize,
        options: &ExecuteOptions,
    ) -> Result<BatchResult, DriverError> {
        match self {
            Self::Rows { .. } | Self::Custom(_) => Ok(uniform_batch(bind_sets, options)),
            Self::RowsAffected(n) => {
                let mut result = BatchResult::new(n);
                if options.dml_row_counts {
                    result = result.with_row_counts(vec![1; bind_sets]);
                }
                Ok(result)
            }
            Self::Error(err) => Err(err),
            Self::BatchErrors(mut errors) => {
                errors.sort_by_key(|e| e.offset);
                if !options.batch_errors {
                    return match errors.into_iter().next() {
                        Some(first) => Err(driver_error_from_batch(first)),
                        None => Ok(uniform_batch(bind_sets, options)),
                    };
                }
                let failed: HashSet<usize> = errors.iter().map(|e| e.offset).collect();
                let counts: Vec<u64> = (0..bind_sets)
                    .map(|i| u64::from(!failed.contains(&i)))
                    .collect();
                let mut result = BatchResult::new(counts.iter().sum()).with_errors(errors);
                if options.dml_row_counts {
                    result = result.with_row_counts(counts);
                }
                Ok(result)
            }
        }
    }
}

fn driver_error_from_batch(error: BatchError) -> DriverError {
    match error.code {
        Some(code) => DriverError::with_code(code, error.message),
        None => DriverError::new(error.message),
    }
}

fn uniform_batch(bind_sets: usize, options: &ExecuteOptions) -> BatchResult {
    let mut result = BatchResult::new(bind_sets as u64);
    if options.dml_row_counts {
        result = result.with_row_counts(vec![1; bind_sets]);
    }
    result
}

fn shape_row(columns: &[String], values: Vec<Value>, format: OutputFormat) -> Row {
    match format {
        OutputFormat::Array => Row::Array(values),
        OutputFormat::Object => {
            let map: Map<String, Value> = columns.iter().cloned().zip(values).collect();
            Row::Object(map)
        }
    }
}

/// A statement call as the mock received it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedCall {
    /// Pool the connection came from.
    pub alias: String,
    /// `execute` or `execute_many`.
    pub kind: CommandKind,
    /// Statement text, verbatim.
    pub statement: String,
    /// Bind sets: exactly one for single statements.
    pub binds: Vec<Binds>,
    /// Options as passed to the driver.
    pub options: ExecuteOptions,
}

/// Counters kept by the mock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockStats {
    /// Successful `create_pool` calls.
    pub pools_created: usize,
    /// `create_pool` calls, including failed ones.
    pub pool_create_attempts: usize,
    /// Connections handed out.
    pub connections_acquired: usize,
    /// `Connection::close` calls, including failed ones.
    pub connections_closed: usize,
    /// `PoolHandle::close` calls, including failed ones.
    pub pools_closed: usize,
}

impl MockStats {
    /// Connections acquired but not yet closed.
    #[must_use]
    pub fn connections_open(&self) -> usize {
        self.connections_acquired - self.connections_closed
    }
}

/// Configuration for the mock provider.
#[derive(Default)]
struct MockConfig {
    responses: HashMap<String, MockResponse>,
    default_response: Option<MockResponse>,
    pool_failures: HashMap<String, DriverError>,
    acquire_failures: HashMap<String, DriverError>,
    pool_close_failures: HashMap<String, DriverError>,
    connection_close_failure: Option<DriverError>,
    create_delay: Option<Duration>,
}

#[derive(Default)]
struct MockLog {
    stats: MockStats,
    created: Vec<String>,
    closed_pools: Vec<String>,
    calls: Vec<ExecutedCall>,
}

struct MockShared {
    config: MockConfig,
    log: Mutex<MockLog>,
}

impl MockShared {
    fn respond(&self, call: &ExecutedCall) -> MockResponse {
        self.config
            .responses
            .get(&call.statement)
            .or(self.config.default_response.as_ref())
            .map(|r| r.resolve(call))
            .unwrap_or_else(MockResponse::empty)
    }
}

/// Builder for [`MockProvider`].
pub struct MockProviderBuilder {
    config: MockConfig,
}

impl MockProviderBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: MockConfig {
                default_response: Some(MockResponse::empty()),
                ..MockConfig::default()
            },
        }
    }

    /// Add a response for a specific statement.
    pub fn with_response(mut self, sql: impl Into<String>, response: MockResponse) -> Self {
        self.config.responses.insert(sql.into(), response);
        self
    }

    /// Set the default response for unmatched statements.
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.config.default_response = Some(response);
        self
    }

    /// Make `create_pool` fail for `alias`.
    pub fn with_pool_failure(mut self, alias: impl Into<String>, error: DriverError) -> Self {
        self.config.pool_failures.insert(alias.into(), error);
        self
    }

    /// Make `get_connection` fail on the pool named `alias`.
    pub fn with_acquire_failure(mut self, alias: impl Into<String>, error: DriverError) -> Self {
        self.config.acquire_failures.insert(alias.into(), error);
        self
    }

    /// Make every `Connection::close` fail.
    pub fn with_connection_close_failure(mut self, error: DriverError) -> Self {
        self.config.connection_close_failure = Some(error);
        self
    }

    /// Make closing the pool named `alias` fail.
    pub fn with_pool_close_failure(mut self, alias: impl Into<String>, error: DriverError) -> Self {
        self.config.pool_close_failures.insert(alias.into(), error);
        self
    }

    /// Delay every `create_pool` call.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.config.create_delay = Some(delay);
        self
    }

    /// Build the provider.
    pub fn build(self) -> MockProvider {
        MockProvider {
            shared: Arc::new(MockShared {
                config: self.config,
                log: Mutex::new(MockLog::default()),
            }),
        }
    }
}

impl Default for MockProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory [`PoolProvider`] for tests.
///
/// Cloning is cheap; clones share configuration and recorded calls, so a
/// test can hand one clone to a `Database` and inspect another.
#[derive(Clone)]
pub struct MockProvider {
    shared: Arc<MockShared>,
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider")
            .field("stats", &self.stats())
            .finish()
    }
}

impl MockProvider {
    /// Create a new builder for the mock provider.
    pub fn builder() -> MockProviderBuilder {
        MockProviderBuilder::new()
    }

    /// This provider as a shareable trait object.
    pub fn shared(&self) -> Arc<dyn PoolProvider> {
        Arc::new(self.clone())
    }

    /// Current counters.
    pub fn stats(&self) -> MockStats {
        self.shared.log.lock().stats
    }

    /// Every statement call received, in arrival order.
    pub fn executions(&self) -> Vec<ExecutedCall> {
        self.shared.log.lock().calls.clone()
    }

    /// Statements received, in arrival order.
    pub fn executed_statements(&self) -> Vec<String> {
        self.shared
            .log
            .lock()
            .calls
            .iter()
            .map(|c| c.statement.clone())
            .collect()
    }

    /// Aliases of successfully created pools, in creation order.
    pub fn created_pools(&self) -> Vec<String> {
        self.shared.log.lock().created.clone()
    }

    /// Aliases of pools closed, in close order (failed closes included).
    pub fn closed_pools(&self) -> Vec<String> {
        self.shared.log.lock().closed_pools.clone()
    }
}

#[async_trait::async_trait]
impl PoolProvider for MockProvider {
    async fn create_pool(&self, config: &PoolConfig) -> Result<Arc<dyn PoolHandle>, DriverError> {
        self.shared.log.lock().stats.pool_create_attempts += 1;

        if let Some(delay) = self.shared.config.create_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.shared.config.pool_failures.get(&config.alias) {
            tracing::debug!(pool = %config.alias, "mock pool creation failing");
            return Err(err.clone());
        }

        {
            let mut log = self.shared.log.lock();
            log.stats.pools_created += 1;
            log.created.push(config.alias.clone());
        }
        tracing::debug!(pool = %config.alias, "mock pool created");

        Ok(Arc::new(MockPool {
            alias: config.alias.clone(),
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MockPool {
    alias: String,
    shared: Arc<MockShared>,
    closed: AtomicBool,
}

#[async_trait::async_trait]
impl PoolHandle for MockPool {
    async fn get_connection(&self) -> Result<Box<dyn Connection>, DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::new("pool is closed"));
        }
        if let Some(err) = self.shared.config.acquire_failures.get(&self.alias) {
            return Err(err.clone());
        }
        self.shared.log.lock().stats.connections_acquired += 1;
        Ok(Box::new(MockConnection {
            alias: self.alias.clone(),
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn close(&self) -> Result<(), DriverError> {
        {
            let mut log = self.shared.log.lock();
            log.stats.pools_closed += 1;
            log.closed_pools.push(self.alias.clone());
        }
        if let Some(err) = self.shared.config.pool_close_failures.get(&self.alias) {
            return Err(err.clone());
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MockConnection {
    alias: String,
    shared: Arc<MockShared>,
}

impl MockConnection {
    fn record(&self, call: ExecutedCall) -> MockResponse {
        let response = self.shared.respond(&call);
        self.shared.log.lock().calls.push(call);
        response
    }
}

#[async_trait::async_trait]
impl Connection for MockConnection {
    async fn execute(
        &mut self,
        statement: &str,
        binds: &Binds,
        options: &ExecuteOptions,
    ) -> Result<ResultSet, DriverError> {
        let response = self.record(ExecutedCall {
            alias: self.alias.clone(),
            kind: CommandKind::Single,
            statement: statement.to_owned(),
            binds: vec![binds.clone()],
            options: options.clone(),
        });
        response.into_result_set(options.output_format)
    }

    async fn execute_many(
        &mut self,
        statement: &str,
        binds: &[Binds],
        options: &ExecuteOptions,
    ) -> Result<BatchResult, DriverError> {
        let response = self.record(ExecutedCall {
            alias: self.alias.clone(),
            kind: CommandKind::Batch,
            statement: statement.to_owned(),
            binds: binds.to_vec(),
            options: options.clone(),
        });
        response.into_batch_result(binds.len(), options)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.shared.log.lock().stats.connections_closed += 1;
        match &self.shared.config.connection_close_failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rows_shaped_by_output_format() {
        let response = MockResponse::rows(["ID", "NAME"], vec![vec![json!(1), json!("Ada")]]);

        let objects = response.clone().into_result_set(OutputFormat::Object).unwrap();
        assert_eq!(objects.rows[0].get("NAME"), Some(&json!("Ada")));

        let arrays = response.into_result_set(OutputFormat::Array).unwrap();
        assert_eq!(arrays.rows[0].get_index(0), Some(&json!(1)));
    }

    #[test]
    fn test_batch_errors_inline_or_abort() {
        let response = MockResponse::batch_errors(vec![BatchError::new(
            2,
            Some(1),
            "unique constraint violated",
        )]);

        let inline = response
            .clone()
            .into_batch_result(4, &ExecuteOptions::new().batch_errors(true).dml_row_counts(true))
            .unwrap();
        assert_eq!(inline.rows_affected, 3);
        assert_eq!(inline.dml_row_counts, vec![1, 1, 0, 1]);
        assert_eq!(inline.failed_offsets().collect::<Vec<_>>(), vec![2]);

        let aborted = response
            .into_batch_result(4, &ExecuteOptions::new())
            .unwrap_err();
        assert_eq!(aborted.code(), Some(1));
    }
}
