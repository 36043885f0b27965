//! Statement and batch results.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name as reported by the driver.
    pub name: String,
    /// Database type name, if the driver reports one.
    #[serde(default)]
    pub db_type: Option<String>,
    /// Whether the column accepts NULL.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl Column {
    /// Create a nullable column with no type information.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            db_type: None,
            nullable: true,
        }
    }

    /// Set the database type name.
    #[must_use]
    pub fn with_type(mut self, db_type: impl Into<String>) -> Self {
        self.db_type = Some(db_type.into());
        self
    }

    /// Set nullable flag.
    #[must_use]
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// One result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Row {
    /// Column values keyed by column name.
    Object(Map<String, Value>),
    /// Column values in column order.
    Array(Vec<Value>),
}

impl Row {
    /// Value of the named column. Always `None` for array rows.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        match self {
            Self::Object(map) => map.get(column),
            Self::Array(_) => None,
        }
    }

    /// Value at a column position. Always `None` for object rows.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        match self {
            Self::Array(values) => values.get(index),
            Self::Object(_) => None,
        }
    }

    /// Whether this row is keyed by column name.
    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Number of columns in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Object(map) => map.len(),
            Self::Array(values) => values.len(),
        }
    }

    /// Whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The outcome of a single statement.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultSet {
    /// Column metadata for queries; empty for DML.
    pub columns: Vec<Column>,
    /// Fetched rows.
    pub rows: Vec<Row>,
    /// Rows affected by DML.
    pub rows_affected: Option<u64>,
}

impl ResultSet {
    /// Create a query result.
    pub fn new(columns: Vec<Column>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            rows_affected: None,
        }
    }

    /// Create a DML result.
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: Some(rows_affected),
        }
    }

    /// Number of fetched rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows were fetched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The first row, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }
}

/// A failure of one bind set inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// Index of the failing bind set.
    pub offset: usize,
    /// Vendor error number.
    pub code: Option<i32>,
    /// Driver error message.
    pub message: String,
}

impl BatchError {
    /// Create a batch row error.
    pub fn new(offset: usize, code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            offset,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "row {}: error {code}: {}", self.offset, self.message),
            None => write!(f, "row {}: {}", self.offset, self.message),
        }
    }
}

/// The outcome of a batch execution.
///
/// Row-level failures do not fail the batch; they are listed in
/// [`batch_errors`](Self::batch_errors).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchResult {
    /// Total rows affected by the successful bind sets.
    pub rows_affected: u64,
    /// Per-bind-set row counts, when requested.
    #[serde(default)]
    pub dml_row_counts: Vec<u64>,
    /// Failures of individual bind sets.
    #[serde(default)]
    pub batch_errors: Vec<BatchError>,
}

impl BatchResult {
    /// Create a batch result with no row errors.
    pub fn new(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            dml_row_counts: Vec::new(),
            batch_errors: Vec::new(),
        }
    }

    /// Attach row errors.
    #[must_use]
    pub fn with_errors(mut self, errors: Vec<BatchError>) -> Self {
        self.batch_errors = errors;
        self
    }

    /// Attach per-bind-set row counts.
    #[must_use]
    pub fn with_row_counts(mut self, counts: Vec<u64>) -> Self {
        self.dml_row_counts = counts;
        self
    }

    /// Whether any bind set failed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.batch_errors.is_empty()
    }

    /// Offsets of the failed bind sets.
    pub fn failed_offsets(&self) -> impl Iterator<Item = usize> + '_ {
        self.batch_errors.iter().map(|e| e.offset)
    }
}
