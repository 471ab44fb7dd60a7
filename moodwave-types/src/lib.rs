//! Core type definitions for Moodwave.
//!
//! This crate defines the small, dependency-light types shared by the
//! storage and sync layers:
//! - Record identifiers (UUID v7) and sync queue item identifiers
//! - An injectable wall clock
//! - The storage key namespace
//!
//! Domain payloads (mood entries, music metadata, ...) live in
//! `moodwave-model`, not here.

mod clock;
mod ids;
mod keys;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ids::{EntityId, SyncItemId};
pub use keys::{StorageKey, SYNC_QUEUE_KEY};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid sync item id: {0}")]
    InvalidSyncItemId(String),
}
