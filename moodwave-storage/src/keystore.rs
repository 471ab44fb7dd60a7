//! Storage for the per-installation data key.
//!
//! The key store is kept apart from the payload store and is expected to be
//! more tightly protected (platform keychain, owner-only file).

use crate::error::{StorageError, StorageResult};
use moodwave_crypto::DataKey;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Persists the data key.
pub trait KeyStore: Send + Sync {
    /// Returns the stored key, or `None` on first run.
    fn load(&self) -> StorageResult<Option<DataKey>>;

    /// Persists `key`, replacing any stored key.
    fn save(&self, key: &DataKey) -> StorageResult<()>;
}

/// Key store backed by a single owner-readable file.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyStore for FileKeyStore {
    fn load(&self) -> StorageResult<Option<DataKey>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let encoded = fs::read_to_string(&self.path)?;
        DataKey::from_base64(&encoded)
            .map(Some)
            .map_err(|e| StorageError::KeyStore(format!("{}: {e}", self.path.display())))
    }

    fn save(&self, key: &DataKey) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write to a sibling and rename so a crash never leaves a torn key.
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            restrict_permissions(&file)?;
            file.write_all(key.to_base64().as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &fs::File) -> std::io::Result<()> {
    Ok(())
}

/// Key store held in memory.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    key: Mutex<Option<DataKey>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `key`.
    pub fn with_key(key: DataKey) -> Self {
        Self {
            key: Mutex::new(Some(key)),
        }
    }

    /// The key currently held, if any.
    pub fn current(&self) -> Option<DataKey> {
        self.key
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl KeyStore for MemoryKeyStore {
    fn load(&self) -> StorageResult<Option<DataKey>> {
        Ok(self.current())
    }

    fn save(&self, key: &DataKey) -> StorageResult<()> {
        *self.key.lock().unwrap_or_else(PoisonError::into_inner) = Some(key.clone());
        Ok(())
    }
}

/// A key store that is never available.
///
/// Used on platforms without a protected key store; the store runs degraded.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableKeyStore;

impl KeyStore for UnavailableKeyStore {
    fn load(&self) -> StorageResult<Option<DataKey>> {
        Err(StorageError::KeyStore("key store unavailable".to_string()))
    }

    fn save(&self, _key: &DataKey) -> StorageResult<()> {
        Err(StorageError::KeyStore("key store unavailable".to_string()))
    }
}
