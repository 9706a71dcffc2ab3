//! Error types for the recall core library.

use thiserror::Error;

/// Top-level error type for recall operations that can fail.
///
/// Pure computation (identity, scheduling) never produces one of these, and
/// store queries report absence through `Option`/empty collections instead.
#[derive(Error, Debug)]
pub enum RecallError {
    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A snapshot's stored checksum does not match its contents.
    #[error("Snapshot checksum mismatch (expected {expected}, found {actual})")]
    ChecksumMismatch {
        /// Checksum recorded in the snapshot header.
        expected: String,
        /// Checksum computed over the snapshot body.
        actual: String,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The flush task could not complete a write.
    #[error("Flush failed: {0}")]
    Flush(String),

    /// The store was closed or its flush task is gone.
    #[error("Card store is closed")]
    Closed,
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, RecallError>;
