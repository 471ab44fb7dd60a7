//! Secure key-value storage for Moodwave.
//!
//! Persists JSON values under namespaced string keys, optionally encrypted
//! at rest, in a local SQLite database.
//!
//! # Architecture
//!
//! - [`KvBackend`] stores raw envelope text; it knows nothing about crypto
//! - [`KeyStore`] holds the per-installation data key apart from the payloads
//! - [`SecureKeyValueStore`] encodes, seals, verifies and migrates values
//!   between the two; corrupt entries are purged and read as absent
//! - If the key store fails the store keeps working in
//!   [`StoreMode::Degraded`], writing protected values unencrypted

mod backend;
mod config;
mod error;
mod keystore;
mod store;

pub use backend::{KvBackend, MemoryBackend, SqliteBackend};
pub use config::StoreConfig;
pub use error::{StorageError, StorageResult};
pub use keystore::{FileKeyStore, KeyStore, MemoryKeyStore, UnavailableKeyStore};
pub use store::{
    MigrationReport, ProtectionLevel, RepairOutcome, ScanReport, SecureKeyValueStore, StoreMode,
    META_PREFIX,
};
