//! The execution facade.
//!
//! [`Database`] owns the pool registry and the readiness gate. It is an
//! explicitly constructed handle: clone it to share it between tasks, or build
//! several independent instances (for example one per test).

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::Instrument;

use crate::binds::Binds;
use crate::config::{DatabaseConfig, PoolConfig};
use crate::connection::ScopedConnection;
use crate::error::{Error, Result};
use crate::gate::{CommandKind, CommandSummary, Pending, ReadinessGate, ReadinessState, ReadySignal};
use crate::instrumentation::{execution_span, span_names};
use crate::options::ExecuteOptions;
use crate::provider::PoolProvider;
use crate::registry::PoolRegistry;
use crate::result::{BatchResult, ResultSet};

/// Readiness-gated access to a set of named connection pools.
///
/// # Example
///
/// ```rust,ignore
/// let db = Database::builder()
///     .provider(provider)
///     .pool(PoolConfig::new("A", "db/a"))
///     .pool(PoolConfig::new("B", "db/b"))
///     .build()?;
///
/// // Queued: the pools don't exist yet.
/// let early = db.execute_one("A", "SELECT 1 FROM DUAL", Binds::none(), ExecuteOptions::new());
///
/// db.initialize().await?;
/// let rows = early.await?;
///
/// // Runs directly.
/// let later = db.execute_one("B", "SELECT 2 FROM DUAL", Binds::none(), ExecuteOptions::new()).await?;
///
/// let report = db.shutdown().await;
/// assert!(report.is_clean());
/// ```
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    provider: Arc<dyn PoolProvider>,
    config: DatabaseConfig,
    registry: RwLock<PoolRegistry>,
    gate: ReadinessGate,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.inner.config)
            .field("registry", &*self.inner.registry.read())
            .field("gate", &self.inner.gate)
            .finish()
    }
}

impl Database {
    /// Create a builder.
    #[must_use]
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Create a database from a provider and a validated configuration.
    pub fn new<P>(provider: P, config: DatabaseConfig) -> Result<Self>
    where
        P: PoolProvider + 'static,
    {
        Self::with_shared_provider(Arc::new(provider), config)
    }

    /// Like [`Database::new`], for a provider that is already shared.
    pub fn with_shared_provider(
        provider: Arc<dyn PoolProvider>,
        config: DatabaseConfig,
    ) -> Result<Self> {
        config.validate()?;
        let gate = ReadinessGate::new(config.queue_timeout);
        Ok(Self {
            inner: Arc::new(DatabaseInner {
                provider,
                config,
                registry: RwLock::new(PoolRegistry::new()),
                gate,
            }),
        })
    }

    /// Create every configured pool, then open the gate.
    ///
    /// Pools are created one after another in configuration order. If any
    /// creation fails, initialization stops, the state becomes
    /// [`ReadinessState::Stuck`] and the error is returned. Requests already
    /// queued stay queued and never settle (unless a queue timeout is
    /// configured). Pools created before the failure stay registered so that
    /// [`shutdown`](Self::shutdown) can close them.
    ///
    /// On success the queued requests are replayed in submission order.
    pub async fn initialize(&self) -> Result<()> {
        let span = tracing::info_span!(span_names::INITIALIZE, pools = self.inner.config.pools.len());
        self.inner.initialize().instrument(span).await
    }

    /// Execute one statement on the named pool.
    ///
    /// Returns immediately. Before readiness the request is queued; it runs
    /// once every pool exists and the returned future settles with its
    /// outcome. Rows are always returned as objects keyed by column name and
    /// the statement is always autocommitted, regardless of `options`.
    pub fn execute_one(
        &self,
        alias: impl Into<String>,
        statement: impl Into<String>,
        binds: Binds,
        options: ExecuteOptions,
    ) -> Pending<ResultSet> {
        let alias = alias.into();
        let statement = statement.into();
        let summary = CommandSummary::new(&alias, CommandKind::Single, &statement, binds.len());
        let inner = Arc::clone(&self.inner);
        self.inner.gate.run_or_defer(summary, move || async move {
            let span = execution_span(CommandKind::Single, &alias, &statement);
            inner
                .run_single(&alias, &statement, &binds, options.forced_single())
                .instrument(span)
                .await
        })
    }

    /// Execute one statement once per bind set on the named pool.
    ///
    /// Same queuing and connection handling as
    /// [`execute_one`](Self::execute_one). Row-level failures are collected
    /// in [`BatchResult::batch_errors`]; only connection or transport
    /// failures make the future fail.
    pub fn execute_many(
        &self,
        alias: impl Into<String>,
        statement: impl Into<String>,
        binds: Vec<Binds>,
        options: ExecuteOptions,
    ) -> Pending<BatchResult> {
        let alias = alias.into();
        let statement = statement.into();
        let summary = CommandSummary::new(&alias, CommandKind::Batch, &statement, binds.len());
        let inner = Arc::clone(&self.inner);
        self.inner.gate.run_or_defer(summary, move || async move {
            let span = execution_span(CommandKind::Batch, &alias, &statement);
            inner
                .run_batch(&alias, &statement, &binds, options.forced_batch())
                .instrument(span)
                .await
        })
    }

    /// Close every registered pool.
    ///
    /// Pools are closed one at a time in configuration order. A failure is
    /// logged and recorded in the report, and the remaining pools are still
    /// closed. Requests still queued are discarded and fail with
    /// [`Error::Closed`], as do all later requests.
    pub async fn shutdown(&self) -> ShutdownReport {
        let span = tracing::info_span!(span_names::SHUTDOWN);
        self.inner.shutdown().instrument(span).await
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ReadinessState {
        self.inner.gate.state()
    }

    /// Whether requests currently run without queuing.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Subscribe to the one-shot readiness notification.
    #[must_use]
    pub fn ready_signal(&self) -> ReadySignal {
        self.inner.gate.subscribe()
    }

    /// Aliases of the pools created so far, in creation order.
    #[must_use]
    pub fn pool_aliases(&self) -> Vec<String> {
        self.inner.registry.read().aliases().to_vec()
    }

    /// Number of requests waiting for readiness.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.gate.pending_len()
    }

    /// The configuration this database was built with.
    #[must_use]
    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }
}

impl DatabaseInner {
    async fn initialize(&self) -> Result<()> {
        self.gate.begin()?;
        tracing::info!("initializing connection pools");

        for pool_config in &self.config.pools {
            let alias = pool_config.alias.as_str();
            let handle = match self.provider.create_pool(pool_config).await {
                Ok(handle) => handle,
                Err(source) => {
                    let err = Error::PoolCreation {
                        alias: alias.to_owned(),
                        source,
                    };
                    tracing::error!(pool = %alias, error = %err, "pool creation failed");
                    self.gate.mark_stuck();
                    return Err(err);
                }
            };

            let inserted = self.registry.write().insert(alias, handle);
            if let Err((err, handle)) = inserted {
                // Shutdown won the race; this pool was never registered.
                if let Err(source) = handle.close().await {
                    tracing::warn!(pool = %alias, error = %source, "closing orphaned pool failed");
                }
                return Err(err);
            }
            tracing::debug!(
                pool = %alias,
                min = pool_config.min_connections,
                max = pool_config.max_connections,
                "pool created"
            );
        }

        let drained = self.gate.open()?;
        tracing::info!(
            pools = self.config.pools.len(),
            drained,
            "connection pools ready"
        );
        Ok(())
    }

    async fn acquire(&self, alias: &str) -> Result<ScopedConnection> {
        let pool = self.registry.read().get(alias)?;
        let connection = pool
            .get_connection()
            .await
            .map_err(|source| Error::ConnectionAcquire {
                alias: alias.to_owned(),
                source,
            })?;
        Ok(ScopedConnection::new(alias, connection))
    }

    async fn run_single(
        &self,
        alias: &str,
        statement: &str,
        binds: &Binds,
        options: ExecuteOptions,
    ) -> Result<ResultSet> {
        let mut conn = self.acquire(alias).await?;
        let outcome = conn.execute(statement, binds, &options).await;
        conn.release().await;

        match outcome {
            Ok(result) => {
                tracing::debug!(rows = result.len(), rows_affected = ?result.rows_affected, "statement executed");
                Ok(result)
            }
            Err(source) => {
                tracing::debug!(error = %source, "statement failed");
                Err(Error::StatementExecution {
                    alias: alias.to_owned(),
                    source,
                })
            }
        }
    }

    async fn run_batch(
        &self,
        alias: &str,
        statement: &str,
        binds: &[Binds],
        options: ExecuteOptions,
    ) -> Result<BatchResult> {
        let mut conn = self.acquire(alias).await?;
        let outcome = conn.execute_many(statement, binds, &options).await;
        conn.release().await;

        match outcome {
            Ok(result) => {
                if result.has_errors() {
                    tracing::debug!(
                        bind_sets = binds.len(),
                        failed = result.batch_errors.len(),
                        "batch executed with row errors"
                    );
                } else {
                    tracing::debug!(bind_sets = binds.len(), "batch executed");
                }
                Ok(result)
            }
            Err(source) => Err(Error::StatementExecution {
                alias: alias.to_owned(),
                source,
            }),
        }
    }

    async fn shutdown(&self) -> ShutdownReport {
        let previous = self.gate.state();
        self.gate.close();
        let pools = self.registry.write().drain();
        tracing::info!(pools = pools.len(), state = %previous, "shutting down");

        let mut report = ShutdownReport::default();
        for (alias, pool) in pools {
            match pool.close().await {
                Ok(()) => {
                    tracing::info!(pool = %alias, "pool closed");
                    report.closed.push(alias);
                }
                Err(source) => {
                    let err = Error::PoolClose { alias, source };
                    tracing::error!(error = %err, "pool close failed");
                    report.failures.push(err);
                }
            }
        }
        report
    }
}

/// Outcome of [`Database::shutdown`].
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct ShutdownReport {
    /// Aliases of pools that closed cleanly, in close order.
    pub closed: Vec<String>,
    /// [`Error::PoolClose`] for each pool that failed to close.
    pub failures: Vec<Error>,
}

impl ShutdownReport {
    /// Whether every pool closed cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Builder for [`Database`].
#[derive(Default)]
pub struct DatabaseBuilder {
    provider: Option<Arc<dyn PoolProvider>>,
    config: DatabaseConfig,
}

impl fmt::Debug for DatabaseBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseBuilder")
            .field("provider", &self.provider.as_ref().map(|_| "<provider>"))
            .field("config", &self.config)
            .finish()
    }
}

impl DatabaseBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool provider.
    #[must_use]
    pub fn provider<P>(mut self, provider: P) -> Self
    where
        P: PoolProvider + 'static,
    {
        self.provider = Some(Arc::new(provider));
        self
    }

    /// Set an already shared pool provider.
    #[must_use]
    pub fn shared_provider(mut self, provider: Arc<dyn PoolProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Append a pool.
    #[must_use]
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.config.pools.push(pool);
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: DatabaseConfig) -> Self {
        self.config = config;
        self
    }

    /// Bound how long queued requests wait for readiness.
    #[must_use]
    pub fn queue_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.queue_timeout = Some(timeout);
        self
    }

    /// Validate the configuration and build the database.
    pub fn build(self) -> Result<Database> {
        let provider = self
            .provider
            .ok_or_else(|| Error::Configuration("a pool provider is required".into()))?;
        Database::with_shared_provider(provider, self.config)
    }
}
