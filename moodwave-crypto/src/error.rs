//! Error types for the encryption layer.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed (wrong key or tampered data).
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Stored digest does not match the sealed bytes.
    #[error("integrity check failed")]
    IntegrityMismatch,

    /// Sealed with a different data key than the one supplied.
    #[error("sealed with key {found}, active key is {expected}")]
    KeyMismatch { expected: String, found: String },

    /// A sealed value was read without any key available.
    #[error("no data key available to open sealed value")]
    KeyUnavailable,

    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Invalid nonce length.
    #[error("invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength { expected: usize, actual: usize },

    /// Envelope version newer than this build understands.
    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u8),

    /// Raw bytes match no known encoding.
    #[error("unrecognised stored format: {0}")]
    UnknownFormat(String),

    /// Invalid base64.
    #[error("invalid encoding: {0}")]
    Encoding(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CryptoError {
    /// Returns true if the stored bytes are definitively unusable, as opposed
    /// to merely unreadable right now (no key loaded).
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        !matches!(self, CryptoError::KeyUnavailable | CryptoError::Encryption(_))
    }
}
