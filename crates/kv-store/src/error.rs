use thiserror::Error;

use crate::Version;

/// Errors that can occur when interacting with the key-value store.
#[derive(Debug, Error)]
pub enum KvStoreError {
    /// A conditional write lost the race: the key moved past the expected revision.
    #[error("Concurrency conflict on key {key}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        key: String,
        expected: Version,
        actual: Version,
    },

    /// The Redis backend returned an error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value did not have the expected shape.
    #[error("Corrupt value at key {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl KvStoreError {
    /// Returns true if this error is a lost compare-and-swap race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, KvStoreError::ConcurrencyConflict { .. })
    }
}

/// Result type for key-value store operations.
pub type Result<T> = std::result::Result<T, KvStoreError>;
