//! Test fixture utilities.

use std::sync::Once;

use gatedb::{Database, DatabaseConfig, PoolConfig, Result};

use crate::mock_provider::MockProvider;

/// Statement used by the two-pool fixtures.
pub const DUAL_QUERY: &str = "SELECT 1 FROM DUAL";

/// Pool configuration with a throwaway connect string.
#[must_use]
pub fn pool(alias: &str) -> PoolConfig {
    PoolConfig::new(alias, format!("localhost/{}", alias.to_lowercase()))
        .user("app")
        .password("app")
}

/// Configuration with pools `A` and `B`, in that order.
#[must_use]
pub fn two_pool_config() -> DatabaseConfig {
    DatabaseConfig::new().pool(pool("A")).pool(pool("B"))
}

/// A database wired to a mock provider, plus a handle on the mock.
pub struct TestFixture {
    /// The database under test.
    pub db: Database,
    /// Shared view of the provider the database uses.
    pub provider: MockProvider,
}

impl TestFixture {
    /// Create a fixture over `config`.
    pub fn new(provider: MockProvider, config: DatabaseConfig) -> Result<Self> {
        let db = Database::with_shared_provider(provider.shared(), config)?;
        Ok(Self { db, provider })
    }

    /// Create a fixture with pools `A` and `B`.
    pub fn two_pools(provider: MockProvider) -> Result<Self> {
        Self::new(provider, two_pool_config())
    }
}

/// Install a test-writer tracing subscriber once per process.
///
/// Honors `RUST_LOG`; silent by default.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
