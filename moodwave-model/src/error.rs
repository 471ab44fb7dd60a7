//! Error types for the domain model.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Validation failures for domain payloads.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// A required field was empty.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Mood score outside the accepted scale.
    #[error("mood score out of range: {0} (expected 1..=10)")]
    MoodOutOfRange(u8),

    /// Daily window bounds are not valid minutes of the day.
    #[error("invalid daily window: {0}")]
    InvalidWindow(String),

    /// Generated track metadata is inconsistent.
    #[error("invalid music metadata: {0}")]
    InvalidMusic(String),

    /// Unknown entity type or action name.
    #[error("unknown {kind}: {value}")]
    Unknown { kind: &'static str, value: String },
}
