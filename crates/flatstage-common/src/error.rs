//! Error types for flatstage
//!
//! One shared taxonomy for the whole workspace: schema errors (a named
//! column is absent), shape errors (a batch's column count disagrees with
//! its file), lifecycle errors (writes after close), lock errors, and
//! source errors (the underlying database failure, propagated unmodified).
//! All of these are fail-fast at the core level; retry or recovery belongs
//! to the per-table script or the operator.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for flatstage operations
pub type Result<T> = std::result::Result<T, StageError>;

/// Main error type for flatstage
#[derive(Error, Debug)]
pub enum StageError {
    /// A named column is absent from a result set
    #[error("Column '{column}' not found in result set. Available columns: {available}.")]
    MissingColumn { column: String, available: String },

    /// A column's database type has no mapping into the staging value model
    #[error("Column '{column}' has unsupported type '{ty}'. Cast it in the query to a supported scalar type.")]
    UnsupportedColumnType { column: String, ty: String },

    /// A batch of rows disagrees with the column count established for its file
    #[error("Output file '{file}' expects {expected} columns per row, got {actual}. The job's query or field order changed mid-run.")]
    ColumnCountMismatch {
        file: String,
        expected: usize,
        actual: usize,
    },

    /// Rows appended to, or records cleaned for, an already-closed target
    #[error("'{0}' is closed. Rows cannot be appended and records cannot be cleaned after close.")]
    Closed(String),

    /// The advisory lock could not be acquired before the timeout
    #[error("Could not acquire lock '{path}' within {waited_ms} ms. Another job holds it; retry later or raise the lock timeout.")]
    LockTimeout { path: PathBuf, waited_ms: u128 },

    /// A SQL template is malformed (e.g. only one of the two range placeholders)
    #[error("Invalid SQL template: {0}")]
    Template(String),

    /// A scalar query returned no usable value
    #[error("Scalar query returned no usable value: {0}")]
    Scalar(String),

    /// A persisted checksum file is unreadable or unparsable
    #[error("Checksum file '{path}' is invalid: {reason}. Delete it to force a full rebuild.")]
    Checksum { path: PathBuf, reason: String },

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your environment variables.")]
    Config(String),

    /// Database operation failed; propagated unmodified from the driver
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),
}

impl StageError {
    /// Create a missing-column error, naming what was available
    pub fn missing_column(column: impl Into<String>, available: &[String]) -> Self {
        Self::MissingColumn {
            column: column.into(),
            available: if available.is_empty() {
                "(none)".to_string()
            } else {
                available.join(", ")
            },
        }
    }

    /// Create a lifecycle error for a closed target
    pub fn closed(target: impl Into<String>) -> Self {
        Self::Closed(target.into())
    }

    /// Create a lock-timeout error
    pub fn lock_timeout(path: impl Into<PathBuf>, waited_ms: u128) -> Self {
        Self::LockTimeout {
            path: path.into(),
            waited_ms,
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a template error
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Create a scalar error
    pub fn scalar(msg: impl Into<String>) -> Self {
        Self::Scalar(msg.into())
    }
}
