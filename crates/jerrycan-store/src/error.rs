use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Opening, reading, writing or deleting a file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A history line is not a valid record.
    #[error("Malformed record: {0}")]
    Json(#[from] serde_json::Error),

    /// A binary record carries invalid Base64 content.
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A binary message carries invalid hex content.
    #[error("Hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),

    /// A record timestamp is not ISO-8601.
    #[error("Timestamp parse error: {0}")]
    Timestamp(#[from] chrono::ParseError),

    /// A message timestamp has no four-digit-year ISO-8601 form.
    #[error("Timestamp out of range: {0}")]
    TimestampOutOfRange(DateTime<Utc>),

    /// No usable storage root (missing permission, no platform directory).
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A blocking I/O task panicked or was cancelled.
    #[error("Worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    /// Whether this error concerns a single record rather than the file as a
    /// whole. Such records are skipped; anything else aborts the read or write.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            StoreError::Json(_)
                | StoreError::Base64(_)
                | StoreError::Hex(_)
                | StoreError::Timestamp(_)
                | StoreError::TimestampOutOfRange(_)
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
