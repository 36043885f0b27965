//! Pool and database configuration.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

/// Default minimum number of connections held open by a pool.
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;

/// Default maximum number of connections a pool may open.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Default number of connections opened when a pool grows.
pub const DEFAULT_INCREMENT: u32 = 1;

/// Default idle time after which surplus connections are closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for one named connection pool.
///
/// This struct is marked `#[non_exhaustive]`; construct it with
/// [`PoolConfig::new`] and the builder methods, or deserialize it.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Unique alias requests use to address this pool.
    pub alias: String,

    /// Connection target passed to the driver (for example `host:port/service`).
    pub connect_string: String,

    /// Database user.
    #[serde(default)]
    pub user: Option<String>,

    /// Database password.
    #[serde(default)]
    pub password: Option<String>,

    /// Minimum number of connections to maintain.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Maximum number of connections allowed.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Number of connections opened each time the pool grows.
    #[serde(default = "default_increment")]
    pub increment: u32,

    /// Time a surplus connection can be idle before being closed.
    #[serde(default = "default_idle_timeout", with = "duration_secs")]
    pub idle_timeout: Duration,
}

fn default_min_connections() -> u32 {
    DEFAULT_MIN_CONNECTIONS
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_increment() -> u32 {
    DEFAULT_INCREMENT
}

fn default_idle_timeout() -> Duration {
    DEFAULT_IDLE_TIMEOUT
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("alias", &self.alias)
            .field("connect_string", &self.connect_string)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("min_connections", &self.min_connections)
            .field("max_connections", &self.max_connections)
            .field("increment", &self.increment)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

impl PoolConfig {
    /// Create a pool configuration with default sizing.
    pub fn new(alias: impl Into<String>, connect_string: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            connect_string: connect_string.into(),
            user: None,
            password: None,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            increment: DEFAULT_INCREMENT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Set the database user.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the database password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the minimum number of connections.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.max_connections = count;
        self
    }

    /// Set the growth increment.
    #[must_use]
    pub fn increment(mut self, count: u32) -> Self {
        self.increment = count;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), Error> {
        if self.alias.trim().is_empty() {
            return Err(Error::Configuration("pool alias must not be empty".into()));
        }
        if self.max_connections == 0 {
            return Err(Error::Configuration(format!(
                "pool '{}': max_connections must be greater than 0",
                self.alias
            )));
        }
        if self.min_connections > self.max_connections {
            return Err(Error::Configuration(format!(
                "pool '{}': min_connections cannot be greater than max_connections",
                self.alias
            )));
        }
        if self.increment == 0 {
            return Err(Error::Configuration(format!(
                "pool '{}': increment must be greater than 0",
                self.alias
            )));
        }
        Ok(())
    }
}

/// Configuration for a [`Database`](crate::Database): the ordered set of
/// pools plus facade settings.
///
/// Pools are created in the order they appear here and closed in the same
/// order on shutdown.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct DatabaseConfig {
    /// Pools to create during initialization.
    pub pools: Vec<PoolConfig>,

    /// How long a queued request waits for readiness before failing with
    /// [`Error::QueueTimeout`]. A timed-out request is abandoned and never
    /// runs. `None` waits forever.
    #[serde(default, rename = "queue_timeout_ms", with = "opt_duration_millis")]
    pub queue_timeout: Option<Duration>,
}

impl DatabaseConfig {
    /// Create an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pool.
    #[must_use]
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pools.push(pool);
        self
    }

    /// Bound how long queued requests wait for readiness.
    #[must_use]
    pub fn queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = Some(timeout);
        self
    }

    /// Parse a configuration from JSON.
    ///
    /// ```rust
    /// use gatedb::DatabaseConfig;
    ///
    /// let config = DatabaseConfig::from_json_str(r#"{
    ///     "pools": [
    ///         { "alias": "hr", "connect_string": "localhost/XEPDB1", "user": "hr" },
    ///         { "alias": "sales", "connect_string": "localhost/XEPDB1", "max_connections": 10 }
    ///     ],
    ///     "queue_timeout_ms": 5000
    /// }"#).unwrap();
    ///
    /// assert_eq!(config.pools.len(), 2);
    /// assert_eq!(config.pools[1].max_connections, 10);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid database config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Aliases in configuration order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.pools.iter().map(|p| p.alias.as_str())
    }

    /// Validate every pool and check that aliases are unique.
    pub fn validate(&self) -> Result<(), Error> {
        let mut seen = HashSet::with_capacity(self.pools.len());
        for pool in &self.pools {
            pool.validate()?;
            if !seen.insert(pool.alias.as_str()) {
                return Err(Error::Configuration(format!(
                    "duplicate pool alias '{}'",
                    pool.alias
                )));
            }
        }
        if self.queue_timeout == Some(Duration::ZERO) {
            return Err(Error::Configuration(
                "queue_timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod opt_duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
