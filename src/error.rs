//! Error types for recordkv
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for recordkv operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A data, index or registry file could not be opened or created
    #[error("Storage unavailable at {}: {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    /// The bytes ran out in the middle of a record
    #[error("Truncated record: {0}")]
    TruncatedRecord(String),

    /// The bytes (or values) do not fit the field list they are read with
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Invalid type name: {0:?}")]
    InvalidTypeName(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    /// The data/index pair of a type was left half-swapped by compaction
    #[error("Corruption during compaction of {type_name}: {detail}")]
    CompactionCorruption { type_name: String, detail: String },

    #[error("Reader pool exhausted: {0}")]
    ReaderPoolExhausted(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KvError {
    /// Wrap an I/O error raised while opening `path`
    pub(crate) fn unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KvError::StorageUnavailable {
            path: path.into(),
            source,
        }
    }

    /// True for [`KvError::TruncatedRecord`]
    pub fn is_truncated(&self) -> bool {
        matches!(self, KvError::TruncatedRecord(_))
    }
}
