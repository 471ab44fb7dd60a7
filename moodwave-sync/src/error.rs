//! Error types for the sync layer.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
///
/// Remote failures during a cycle are not errors: they are classified as
/// [`RemoteError`](crate::RemoteError) and folded into the queue's retry
/// bookkeeping.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network error outside a sync cycle (client construction, token refresh).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] moodwave_storage::StorageError),

    /// Payload failed validation and was not written.
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] moodwave_model::ModelError),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Record to update does not exist locally.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// No async runtime to spawn the periodic timer on.
    #[error("runtime error: {0}")]
    Runtime(String),
}
