//! Scoped connection borrowing.

use crate::binds::Binds;
use crate::error::Error;
use crate::options::ExecuteOptions;
use crate::provider::{Connection, DriverError};
use crate::result::{BatchResult, ResultSet};

/// A connection borrowed for exactly one statement or batch.
///
/// [`release`](Self::release) returns it to the pool. If the guard is dropped
/// while still holding the connection (the owning future was dropped
/// mid-call), the close is spawned onto the current runtime instead.
pub(crate) struct ScopedConnection {
    alias: String,
    connection: Option<Box<dyn Connection>>,
}

impl ScopedConnection {
    pub(crate) fn new(alias: &str, connection: Box<dyn Connection>) -> Self {
        Self {
            alias: alias.to_owned(),
            connection: Some(connection),
        }
    }

    fn connection(&mut self) -> Result<&mut Box<dyn Connection>, DriverError> {
        self.connection
            .as_mut()
            .ok_or_else(|| DriverError::new("connection already released"))
    }

    pub(crate) async fn execute(
        &mut self,
        statement: &str,
        binds: &Binds,
        options: &ExecuteOptions,
    ) -> Result<ResultSet, DriverError> {
        self.connection()?.execute(statement, binds, options).await
    }

    pub(crate) async fn execute_many(
        &mut self,
        statement: &str,
        binds: &[Binds],
        options: &ExecuteOptions,
    ) -> Result<BatchResult, DriverError> {
        self.connection()?.execute_many(statement, binds, options).await
    }

    /// Return the connection to its pool. Failures are logged, not returned.
    pub(crate) async fn release(mut self) {
        if let Some(connection) = self.connection.take() {
            close_logged(&self.alias, connection).await;
        }
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let alias = std::mem::take(&mut self.alias);
                handle.spawn(async move { close_logged(&alias, connection).await });
            }
            Err(_) => {
                tracing::warn!(
                    pool = %self.alias,
                    "connection dropped outside a tokio runtime; close skipped"
                );
            }
        }
    }
}

async fn close_logged(alias: &str, mut connection: Box<dyn Connection>) {
    match connection.close().await {
        Ok(()) => tracing::trace!(pool = %alias, "connection released"),
        Err(source) => {
            let err = Error::ConnectionClose {
                alias: alias.to_owned(),
                source,
            };
            tracing::warn!(pool = %alias, error = %err, "connection close failed");
        }
    }
}
