//! Error types for the checkpoint storage layer

use thiserror::Error;

/// Result type alias using the storage layer Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the checkpoint storage layer
#[derive(Error, Debug)]
pub enum Error {
    // Path and location errors
    #[error("Malformed storage location: {path}")]
    MalformedLocation { path: String },

    #[error("Invalid stream mode {mode:?}: only \"rb\" (read) and \"wb\" (write) are supported")]
    InvalidStreamMode { mode: String },

    #[error("Rename cannot span buckets: {src} -> {dst}")]
    CrossBucketRename { src: String, dst: String },

    // Object store errors
    #[error("Object not found: {path}")]
    ObjectNotFound { path: String },

    #[error("Access denied: {path}")]
    AccessDenied { path: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    // Checkpoint errors
    #[error("Checkpoint metadata corrupted: {reason}")]
    CorruptMetadata { reason: String },

    #[error("Checkpoint write failed: {message}")]
    CheckpointWriteFailed { message: String },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Returns true if this error is transient and eligible for retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage { .. })
    }

    /// Returns true if this error indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::CorruptMetadata { .. } | Error::InvalidConfig { .. } | Error::Internal { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
