//! Bind parameters.
//!
//! Values are opaque to gatedb and handed to the driver unchanged, so they
//! are carried as [`serde_json::Value`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Bind parameters for one statement execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Binds {
    /// Values bound by position (`:1`, `:2`, ...).
    Positional(Vec<Value>),
    /// Values bound by name (`:id`, `:name`, ...).
    Named(Map<String, Value>),
}

impl Default for Binds {
    fn default() -> Self {
        Self::none()
    }
}

impl Binds {
    /// No bind parameters.
    #[must_use]
    pub fn none() -> Self {
        Self::Positional(Vec::new())
    }

    /// Positional binds from any sequence of values.
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    /// Named binds from `(name, value)` pairs.
    pub fn named<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Number of bound values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(values) => values.len(),
            Self::Named(map) => map.len(),
        }
    }

    /// Whether there are no bound values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<Value>> for Binds {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

impl From<Map<String, Value>> for Binds {
    fn from(map: Map<String, Value>) -> Self {
        Self::Named(map)
    }
}
