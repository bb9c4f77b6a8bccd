//! Error and Result types for log store operations.

use std::io;
use thiserror::Error;

/// A convenience `Result` type for log store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// The error type for log store operations.
///
/// Truncated or corrupt records are deliberately absent: the codec reports
/// them as the end of readable data instead of failing.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The checkpoint file exists but does not hold a valid WAL index.
    #[error("Invalid checkpoint: {0}")]
    InvalidCheckpoint(String),

    /// A bloom index sidecar could not be parsed.
    #[error("Corrupt bloom index: {0}")]
    CorruptBloomIndex(String),

    /// A bloom index sidecar failed its CRC32 check.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Expected CRC32 checksum.
        expected: u32,
        /// Actual computed CRC32 checksum.
        actual: u32,
    },

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The batcher task is no longer running.
    #[error("Batcher task stopped")]
    BatcherStopped,

    /// A background task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
