use telemon_common::types::{MetricKind, ValidationError};

/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use telemon_storage::error::StorageError;
///
/// let err = StorageError::NotFound("heap_alloc".to_string());
/// assert!(err.to_string().contains("heap_alloc"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The name is already recorded with another kind.
    #[error("Storage: metric '{name}' is a {stored}, not a {requested}")]
    KindMismatch {
        name: String,
        stored: MetricKind,
        requested: MetricKind,
    },

    /// No metric with this name has been recorded.
    #[error("Storage: metric '{0}' not found")]
    NotFound(String),

    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A persisted line could not be decoded.
    #[error("Storage: malformed record on line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },

    /// A persisted record decoded but does not describe a valid write.
    #[error("Storage: invalid record for metric '{id}': {source}")]
    InvalidRecord {
        id: String,
        source: ValidationError,
    },

    /// Reading or writing the metric log failed.
    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic storage error for cases not covered by other variants.
    #[error("Storage: {0}")]
    Other(String),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
