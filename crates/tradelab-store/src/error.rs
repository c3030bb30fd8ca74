//! Error types for the store layer.
//!
//! All errors are propagated via [`StoreError`]. [`StoreError::VersionConflict`]
//! is the one expected, transient condition: callers re-read and retry.

/// Errors that can occur in the store layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored version moved since the caller read it.
    #[error("version conflict on {key}: expected {expected}, found {found}")]
    VersionConflict {
        /// The contended key.
        key: String,
        /// The version the caller read.
        expected: u64,
        /// The version currently stored.
        found: u64,
    },

    /// A conditional write targeted a key that holds no record.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// A record was created for a key that already holds one.
    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    /// A stored value does not have the expected shape.
    #[error("Corrupt record at {key}: {reason}")]
    Corrupt {
        /// The key holding the bad value.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether the error is a version conflict (the retryable case).
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}
