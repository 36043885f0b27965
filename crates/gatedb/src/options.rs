//! Execution options passed through to the driver.

use serde::{Deserialize, Serialize};

/// Shape of the rows in a [`ResultSet`](crate::ResultSet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Each row is an array of column values.
    #[default]
    Array,
    /// Each row is an object keyed by column name.
    Object,
}

/// Options for a single statement or a batch.
///
/// gatedb overrides some of these on every call: rows are always returned as
/// objects, every statement autocommits, and batches always collect row
/// errors inline. Whatever the caller sets for those fields is replaced; see
/// [`forced_single`](Self::forced_single) and
/// [`forced_batch`](Self::forced_batch).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct ExecuteOptions {
    /// Row shape. Forced to [`OutputFormat::Object`].
    pub output_format: OutputFormat,

    /// Commit after each statement. Forced to `true`.
    pub auto_commit: bool,

    /// Batch mode only: keep going past failing rows and report them in the
    /// result. Forced to `true` for batches.
    pub batch_errors: bool,

    /// Batch mode only: report the affected-row count of each bind set.
    pub dml_row_counts: bool,

    /// Upper bound on rows fetched by a query.
    pub max_rows: Option<u32>,

    /// Rows fetched per round trip.
    pub fetch_array_size: Option<u32>,
}

impl ExecuteOptions {
    /// Create options with driver defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the row shape.
    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Set autocommit.
    #[must_use]
    pub fn auto_commit(mut self, enabled: bool) -> Self {
        self.auto_commit = enabled;
        self
    }

    /// Set inline batch error collection.
    #[must_use]
    pub fn batch_errors(mut self, enabled: bool) -> Self {
        self.batch_errors = enabled;
        self
    }

    /// Request per-bind-set row counts for batches.
    #[must_use]
    pub fn dml_row_counts(mut self, enabled: bool) -> Self {
        self.dml_row_counts = enabled;
        self
    }

    /// Limit the number of fetched rows.
    #[must_use]
    pub fn max_rows(mut self, rows: u32) -> Self {
        self.max_rows = Some(rows);
        self
    }

    /// Set the fetch array size.
    #[must_use]
    pub fn fetch_array_size(mut self, rows: u32) -> Self {
        self.fetch_array_size = Some(rows);
        self
    }

    /// Apply the overrides used for single statements.
    #[must_use]
    pub fn forced_single(mut self) -> Self {
        self.output_format = OutputFormat::Object;
        self.auto_commit = true;
        self
    }

    /// Apply the overrides used for batches.
    #[must_use]
    pub fn forced_batch(self) -> Self {
        let mut opts = self.forced_single();
        opts.batch_errors = true;
        opts
    }
}
