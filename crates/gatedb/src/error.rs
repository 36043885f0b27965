//! Error types.

use std::time::Duration;

use thiserror::Error;

use crate::gate::ReadinessState;
use crate::provider::DriverError;

/// Errors that can occur while initializing pools or executing requests.
///
/// Request-level failures ([`PoolLookup`](Self::PoolLookup),
/// [`ConnectionAcquire`](Self::ConnectionAcquire),
/// [`StatementExecution`](Self::StatementExecution)) are returned to the
/// caller. [`ConnectionClose`](Self::ConnectionClose) is only ever logged:
/// it never replaces the outcome of the statement that used the connection.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A pool could not be created during initialization.
    ///
    /// This halts initialization. The database never becomes ready.
    #[error("failed to create pool '{alias}': {source}")]
    PoolCreation {
        /// Alias of the pool that failed.
        alias: String,
        /// Driver-reported cause.
        source: DriverError,
    },

    /// No pool is registered under the requested alias.
    #[error("no pool registered under alias '{0}'")]
    PoolLookup(String),

    /// The pool could not supply a connection.
    #[error("failed to acquire connection from pool '{alias}': {source}")]
    ConnectionAcquire {
        /// Pool alias.
        alias: String,
        /// Driver-reported cause.
        source: DriverError,
    },

    /// The driver rejected the statement or the batch as a whole.
    #[error("statement execution failed on pool '{alias}': {source}")]
    StatementExecution {
        /// Pool alias.
        alias: String,
        /// Driver-reported cause.
        source: DriverError,
    },

    /// Returning a connection to its pool failed.
    #[error("failed to close connection from pool '{alias}': {source}")]
    ConnectionClose {
        /// Pool alias.
        alias: String,
        /// Driver-reported cause.
        source: DriverError,
    },

    /// Closing a pool during shutdown failed.
    #[error("failed to close pool '{alias}': {source}")]
    PoolClose {
        /// Pool alias.
        alias: String,
        /// Driver-reported cause.
        source: DriverError,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// `initialize` was called more than once.
    #[error("initialize already called (state: {0})")]
    AlreadyInitialized(ReadinessState),

    /// The database has been shut down.
    #[error("database is closed")]
    Closed,

    /// A queued request waited longer than the configured queue timeout.
    #[error("request timed out after {0:?} waiting for pools to become ready")]
    QueueTimeout(Duration),
}

impl Error {
    /// The underlying driver error, if this failure came from the provider.
    #[must_use]
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            Self::PoolCreation { source, .. }
            | Self::ConnectionAcquire { source, .. }
            | Self::StatementExecution { source, .. }
            | Self::ConnectionClose { source, .. }
            | Self::PoolClose { source, .. } => Some(source),
            _ => None,
        }
    }

    /// The pool alias this error refers to, if any.
    #[must_use]
    pub fn pool_alias(&self) -> Option<&str> {
        match self {
            Self::PoolCreation { alias, .. }
            | Self::ConnectionAcquire { alias, .. }
            | Self::StatementExecution { alias, .. }
            | Self::ConnectionClose { alias, .. }
            | Self::PoolClose { alias, .. } => Some(alias),
            Self::PoolLookup(alias) => Some(alias),
            _ => None,
        }
    }

    /// Whether this error is delivered to callers of `execute_*`.
    ///
    /// Close failures are infrastructure noise and are swallowed after logging.
    #[must_use]
    pub fn is_caller_facing(&self) -> bool {
        !matches!(self, Self::ConnectionClose { .. } | Self::PoolClose { .. })
    }
}

/// Result type for gatedb operations.
pub type Result<T> = std::result::Result<T, Error>;
