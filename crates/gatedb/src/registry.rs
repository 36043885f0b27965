//! Registry of live pools by alias.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::provider::PoolHandle;

/// Alias to pool mapping.
///
/// Filled during initialization and read-only afterwards. Remembers insertion
/// order so shutdown closes pools in configuration order. Once drained it is
/// closed for good: lookups fail with [`Error::Closed`] and inserts are
/// refused.
#[derive(Default)]
pub struct PoolRegistry {
    pools: HashMap<String, Arc<dyn PoolHandle>>,
    order: Vec<String>,
    closed: bool,
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("aliases", &self.order)
            .field("closed", &self.closed)
            .finish()
    }
}

impl PoolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pool.
    ///
    /// On failure the handle is returned alongside the error so the caller
    /// can close it.
    pub fn insert(
        &mut self,
        alias: impl Into<String>,
        handle: Arc<dyn PoolHandle>,
    ) -> std::result::Result<(), (Error, Arc<dyn PoolHandle>)> {
        let alias = alias.into();
        if self.closed {
            return Err((Error::Closed, handle));
        }
        if self.pools.contains_key(&alias) {
            return Err((
                Error::Configuration(format!("duplicate pool alias '{alias}'")),
                handle,
            ));
        }
        self.order.push(alias.clone());
        self.pools.insert(alias, handle);
        Ok(())
    }

    /// Look up a pool by alias.
    pub fn get(&self, alias: &str) -> Result<Arc<dyn PoolHandle>> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.pools
            .get(alias)
            .cloned()
            .ok_or_else(|| Error::PoolLookup(alias.to_owned()))
    }

    /// Whether a pool is registered under `alias`.
    #[must_use]
    pub fn contains(&self, alias: &str) -> bool {
        self.pools.contains_key(alias)
    }

    /// Registered aliases in insertion order.
    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.order
    }

    /// Number of registered pools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no pools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Whether the registry has been drained.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Remove every pool, in insertion order, and close the registry.
    pub fn drain(&mut self) -> Vec<(String, Arc<dyn PoolHandle>)> {
        self.closed = true;
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|alias| {
                let handle = self.pools.remove(&alias)?;
                Some((alias, handle))
            })
            .collect()
    }
}
