//! Encryption-at-rest layer for Moodwave.
//!
//! # Scheme
//!
//! - One random 256-bit [`DataKey`] per installation, held by the storage
//!   layer's key store.
//! - Protected values are sealed with ChaCha20-Poly1305 under a fresh nonce,
//!   bound to their storage key as associated data.
//! - A SHA-256 digest of the sealed bytes is stored alongside the ciphertext
//!   and checked before decryption; the AEAD tag is checked during it.
//!   Tampering or corruption therefore always surfaces as an error, never as
//!   a wrong value.
//! - Everything is wrapped in a versioned [`Envelope`]; [`migrate`] reads the
//!   current version and every earlier encoding.

mod cipher;
mod envelope;
mod error;
mod key;

pub use cipher::{open, seal, SealedData, NONCE_SIZE, TAG_SIZE};
pub use envelope::{
    classify, encode_legacy_sealed, migrate, Decoded, Envelope, LegacyScheme, StoredFormat,
    CIPHER_SUITE, CURRENT_VERSION, LEGACY_SEALED_PREFIX,
};
pub use error::{CryptoError, CryptoResult};
pub use key::{DataKey, KEY_SIZE};
