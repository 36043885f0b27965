//! The pool provider capability.
//!
//! gatedb does not talk to a database itself. A driver integration implements
//! these traits: [`PoolProvider`] builds pools from configuration,
//! [`PoolHandle`] hands out connections, and [`Connection`] runs statements.
//!
//! The traits use `#[async_trait]` so they can be held as trait objects
//! (`Arc<dyn PoolProvider>`, `Box<dyn Connection>`).

use std::fmt;
use std::sync::Arc;

use crate::binds::Binds;
use crate::config::PoolConfig;
use crate::options::ExecuteOptions;
use crate::result::{BatchResult, ResultSet};

/// An error reported by the underlying driver.
///
/// The payload is opaque to gatedb; it is carried through to the caller
/// inside an [`Error`](crate::Error) variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    code: Option<i32>,
    message: String,
}

impl DriverError {
    /// Create a driver error without a numeric code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Create a driver error with a vendor error number.
    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Vendor error number, if the driver supplied one.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// Driver error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "error {code}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DriverError {}

/// Creates named connection pools.
#[async_trait::async_trait]
pub trait PoolProvider: Send + Sync {
    /// Create a pool for the given configuration.
    ///
    /// Called once per configured pool, in configuration order, during
    /// [`Database::initialize`](crate::Database::initialize).
    async fn create_pool(&self, config: &PoolConfig) -> Result<Arc<dyn PoolHandle>, DriverError>;
}

/// A live connection pool.
#[async_trait::async_trait]
pub trait PoolHandle: Send + Sync {
    /// Borrow a connection from the pool.
    async fn get_connection(&self) -> Result<Box<dyn Connection>, DriverError>;

    /// Close the pool, terminating its connections.
    async fn close(&self) -> Result<(), DriverError>;
}

/// A connection borrowed from a [`PoolHandle`].
///
/// gatedb calls exactly one of [`execute`](Self::execute) or
/// [`execute_many`](Self::execute_many), then [`close`](Self::close), which
/// returns the connection to its pool.
#[async_trait::async_trait]
pub trait Connection: Send {
    /// Execute a single statement.
    async fn execute(
        &mut self,
        statement: &str,
        binds: &Binds,
        options: &ExecuteOptions,
    ) -> Result<ResultSet, DriverError>;

    /// Execute one statement once per bind set.
    ///
    /// With [`ExecuteOptions::batch_errors`] set, row failures belong in
    /// [`BatchResult::batch_errors`] and only transport-level failures return
    /// `Err`.
    async fn execute_many(
        &mut self,
        statement: &str,
        binds: &[Binds],
        options: &ExecuteOptions,
    ) -> Result<BatchResult, DriverError>;

    /// Release the connection back to its pool.
    async fn close(&mut self) -> Result<(), DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::with_code(1017, "invalid username/password; logon denied");
        assert_eq!(
            err.to_string(),
            "error 1017: invalid username/password; logon denied"
        );

        let err = DriverError::new("pool is draining");
        assert_eq!(err.to_string(), "pool is draining");
        assert_eq!(err.code(), None);
        assert_eq!(err.message(), "pool is draining");
    }
}
