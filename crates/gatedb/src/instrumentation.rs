//! Tracing support for gated database operations.
//!
//! Statements are logged when a request is queued and attached to the span of
//! every execution. Literal values are replaced with placeholders before they
//! reach a log record, and bind values are never logged (only their count).
//!
//! ## Span and Field Names
//!
//! - `gatedb.initialize`, `gatedb.execute_one`, `gatedb.execute_many`,
//!   `gatedb.shutdown`
//! - `pool`: pool alias
//! - `db.operation`: leading SQL keyword (SELECT, INSERT, ...)
//! - `db.statement`: sanitized statement text

use tracing::Span;

use crate::gate::CommandKind;

/// Span names for database operations.
pub mod span_names {
    /// Span name for pool initialization.
    pub const INITIALIZE: &str = "gatedb.initialize";
    /// Span name for single statement execution.
    pub const EXECUTE_ONE: &str = "gatedb.execute_one";
    /// Span name for batch execution.
    pub const EXECUTE_MANY: &str = "gatedb.execute_many";
    /// Span name for shutdown.
    pub const SHUTDOWN: &str = "gatedb.shutdown";
}

/// Sanitization applied to statements before they are logged.
#[derive(Debug, Clone)]
pub(crate) struct SanitizationConfig {
    /// Maximum length of statement to record.
    pub(crate) max_length: usize,
    /// Placeholder to use for sanitized values.
    pub(crate) placeholder: String,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            max_length: 512,
            placeholder: "?".to_string(),
        }
    }
}

impl SanitizationConfig {
    /// Replace literals, then truncate to `max_length`.
    #[must_use]
    pub(crate) fn sanitize(&self, sql: &str) -> String {
        let sanitized = sanitize_sql(sql, &self.placeholder);
        truncate_string(&sanitized, self.max_length)
    }
}

/// Replace string and numeric literals with a placeholder.
fn sanitize_sql(sql: &str, placeholder: &str) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            if c == '\'' {
                // '' is an escaped quote inside a literal
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    continue;
                }
                in_string = false;
                result.push_str(placeholder);
            }
            continue;
        }

        if c == '\'' {
            in_string = true;
            continue;
        }

        // Bind placeholders like :1 stay as they are
        if c.is_ascii_digit()
            && !result.ends_with(|ch: char| ch.is_alphanumeric() || ch == '_' || ch == ':')
        {
            while chars
                .peek()
                .is_some_and(|ch| ch.is_ascii_digit() || *ch == '.')
            {
                chars.next();
            }
            result.push_str(placeholder);
            continue;
        }

        result.push(c);
    }

    if in_string {
        result.push_str(placeholder);
    }

    result
}

/// Truncate a string to at most `max_len` bytes on a char boundary.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len.saturating_sub(3);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Extract the operation type from a SQL statement.
#[must_use]
pub fn extract_operation(sql: &str) -> &'static str {
    let keyword = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();

    match keyword.as_str() {
        "SELECT" | "WITH" => "SELECT",
        "INSERT" => "INSERT",
        "UPDATE" => "UPDATE",
        "DELETE" => "DELETE",
        "MERGE" => "MERGE",
        "BEGIN" | "DECLARE" | "CALL" | "EXEC" | "EXECUTE" => "PLSQL",
        "CREATE" => "CREATE",
        "ALTER" => "ALTER",
        "DROP" => "DROP",
        "TRUNCATE" => "TRUNCATE",
        _ => "OTHER",
    }
}

/// Build the span wrapping one execution.
pub(crate) fn execution_span(kind: CommandKind, alias: &str, statement: &str) -> Span {
    let operation = extract_operation(statement);
    match kind {
        CommandKind::Single => tracing::debug_span!(
            span_names::EXECUTE_ONE,
            pool = %alias,
            db.operation = operation,
        ),
        CommandKind::Batch => tracing::debug_span!(
            span_names::EXECUTE_MANY,
            pool = %alias,
            db.operation = operation,
        ),
    }
}
