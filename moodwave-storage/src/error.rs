//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
///
/// Corrupt entries are not errors: they are purged and read as absent.
/// Apart from [`StorageError::Unreadable`], these variants cover the backend
/// itself failing.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Encryption error while writing.
    #[error("encryption error: {0}")]
    Encryption(#[from] moodwave_crypto::CryptoError),

    /// The key store could not load or persist the data key.
    #[error("key store error: {0}")]
    KeyStore(String),

    /// The entry is sealed and no data key is loaded. It is kept as is and
    /// cannot be read or replaced until the key store recovers.
    #[error("entry {0} is sealed and no data key is loaded")]
    Unreadable(String),

    /// Key is reserved for store metadata.
    #[error("reserved key: {0}")]
    ReservedKey(String),
}
