//! The secure key-value store.

use crate::backend::{KvBackend, MemoryBackend, SqliteBackend};
use crate::config::StoreConfig;
use crate::error::{StorageError, StorageResult};
use crate::keystore::{FileKeyStore, KeyStore, MemoryKeyStore};
use moodwave_crypto::{classify, migrate, CryptoError, DataKey, Decoded, Envelope};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Prefix of internal bookkeeping entries.
pub const META_PREFIX: &str = "__meta__:";

/// Fingerprint of the data key the store last ran with.
const META_KEY_ID: &str = "__meta__:key_id";

/// How a value is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtectionLevel {
    /// Stored as plain JSON inside an envelope; for bulk, non-sensitive data.
    #[default]
    Plain,
    /// Encrypted with the data key and integrity-checked on read.
    Protected,
}

/// Whether a data key is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Not yet initialized.
    Uninitialized,
    /// Protected values are encrypted.
    Encrypted,
    /// The key store failed; protected values are written unencrypted and
    /// existing sealed values cannot be read.
    Degraded,
}

/// Outcome of [`SecureKeyValueStore::repair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    /// The entry is readable (and was rewritten if it used a legacy encoding).
    Recovered,
    /// The entry was corrupt and has been removed.
    Purged,
    /// The entry is sealed but no key is loaded; it was left in place.
    Unreadable,
    /// Nothing stored under the key.
    Missing,
}

/// Summary of the scan performed by [`SecureKeyValueStore::initialize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Entries in the current envelope format.
    pub current: usize,
    /// Entries in a legacy encoding, queued for re-encoding on next access.
    pub legacy: usize,
    /// Entries that matched no known format and were removed.
    pub purged: usize,
}

/// Summary of [`SecureKeyValueStore::migrate_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub recovered: usize,
    pub purged: usize,
    pub unreadable: usize,
}

struct KeyState {
    mode: StoreMode,
    key: Option<DataKey>,
}

/// Durable, namespaced key → JSON value storage with optional encryption at
/// rest.
///
/// Corrupt entries never reach the caller: a value that fails its integrity
/// check or does not deserialize is purged and read as absent.
pub struct SecureKeyValueStore {
    backend: Arc<dyn KvBackend>,
    keystore: Arc<dyn KeyStore>,
    state: RwLock<KeyState>,
    pending_migration: Mutex<BTreeSet<String>>,
}

impl SecureKeyValueStore {
    /// Creates a store over the given backend and key store.
    ///
    /// The data key is loaded lazily; call [`initialize`](Self::initialize)
    /// at startup to also scan for legacy and corrupt entries.
    pub fn new(backend: Arc<dyn KvBackend>, keystore: Arc<dyn KeyStore>) -> Self {
        Self {
            backend,
            keystore,
            state: RwLock::new(KeyState {
                mode: StoreMode::Uninitialized,
                key: None,
            }),
            pending_migration: Mutex::new(BTreeSet::new()),
        }
    }

    /// Opens the on-disk store described by `config`.
    pub fn open(config: &StoreConfig) -> StorageResult<Self> {
        let backend = SqliteBackend::open(&config.database_path)?;
        Ok(Self::new(
            Arc::new(backend),
            Arc::new(FileKeyStore::new(&config.key_path)),
        ))
    }

    /// An ephemeral, encrypted store.
    pub fn open_in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), Arc::new(MemoryKeyStore::new()))
    }

    /// The raw backend. Bypasses encryption and integrity checks.
    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    pub fn mode(&self) -> StoreMode {
        self.state.read().unwrap_or_else(PoisonError::into_inner).mode
    }

    /// Fingerprint of the active data key.
    pub fn key_fingerprint(&self) -> Option<String> {
        self.ensure_key();
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.key.as_ref().map(DataKey::fingerprint)
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Loads or creates the data key and scans stored entries.
    ///
    /// Never fails: a key store that cannot be used puts the store in
    /// [`StoreMode::Degraded`], and a backend that cannot be scanned yields
    /// an empty report. Safe to call repeatedly.
    pub fn initialize(&self) -> ScanReport {
        self.ensure_key();
        match self.scan() {
            Ok(report) => {
                info!(
                    current = report.current,
                    legacy = report.legacy,
                    purged = report.purged,
                    mode = ?self.mode(),
                    "secure store initialized"
                );
                report
            }
            Err(e) => {
                warn!("secure store scan failed: {}", e);
                ScanReport::default()
            }
        }
    }

    fn ensure_key(&self) {
        if self.mode() != StoreMode::Uninitialized {
            return;
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.mode != StoreMode::Uninitialized {
            return;
        }

        let key = match self.keystore.load() {
            Ok(Some(key)) => Some(key),
            Ok(None) => {
                let key = DataKey::generate();
                match self.keystore.save(&key) {
                    Ok(()) => {
                        info!("generated new data key {}", key.fingerprint());
                        Some(key)
                    }
                    Err(e) => {
                        warn!("could not persist data key, running unencrypted: {}", e);
                        None
                    }
                }
            }
            Err(e) => {
                warn!("key store unavailable, running unencrypted: {}", e);
                None
            }
        };

        match key {
            Some(key) => {
                self.record_key_id(&key);
                state.key = Some(key);
                state.mode = StoreMode::Encrypted;
            }
            None => state.mode = StoreMode::Degraded,
        }
    }

    fn record_key_id(&self, key: &DataKey) {
        let active = key.fingerprint();
        match self.backend.get(META_KEY_ID) {
            Ok(Some(previous)) if previous == active => return,
            Ok(Some(previous)) => warn!(
                previous = %previous,
                active = %active,
                "data key changed; values sealed under the previous key will be purged on access"
            ),
            Ok(None) => {}
            Err(e) => debug!("could not read key id: {}", e),
        }
        if let Err(e) = self.backend.put(META_KEY_ID, &active) {
            debug!("could not record key id: {}", e);
        }
    }

    fn scan(&self) -> StorageResult<ScanReport> {
        let mut report = ScanReport::default();
        for key in self.keys()? {
            let Some(raw) = self.backend.get(&key)? else {
                continue;
            };
            match classify(&raw) {
                Ok(format) if format.legacy_scheme().is_some() => {
                    report.legacy += 1;
                    self.pending().insert(key);
                }
                Ok(_) => report.current += 1,
                Err(e) => {
                    self.purge(&key, &e)?;
                    report.purged += 1;
                }
            }
        }
        Ok(report)
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.pending_migration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Keys found in a legacy encoding and not yet rewritten.
    pub fn pending_migrations(&self) -> Vec<String> {
        self.pending().iter().cloned().collect()
    }

    /// Rewrites every pending legacy entry now instead of on next access.
    pub fn migrate_all(&self) -> StorageResult<MigrationReport> {
        let mut report = MigrationReport::default();
        for key in self.pending_migrations() {
            match self.repair(&key)? {
                RepairOutcome::Recovered => report.recovered += 1,
                RepairOutcome::Purged => report.purged += 1,
                RepairOutcome::Unreadable => report.unreadable += 1,
                RepairOutcome::Missing => {
                    self.pending().remove(&key);
                }
            }
        }
        Ok(report)
    }

    // ── Reads and writes ─────────────────────────────────────────

    /// Serializes `value` and writes it under `key`, replacing any previous
    /// value.
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        level: ProtectionLevel,
    ) -> StorageResult<()> {
        if key.starts_with(META_PREFIX) {
            return Err(StorageError::ReservedKey(key.to_string()));
        }
        let value = serde_json::to_value(value)?;
        self.write_value(key, value, level)
    }

    fn write_value(&self, key: &str, value: Value, level: ProtectionLevel) -> StorageResult<()> {
        self.ensure_key();
        let envelope = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if state.key.is_none() {
                self.guard_sealed(key)?;
            }
            match (level, state.key.as_ref()) {
                (ProtectionLevel::Protected, Some(data_key)) => {
                    Envelope::seal(data_key, key, &value)?
                }
                (ProtectionLevel::Protected, None) => {
                    warn!(key = %key, "store degraded, writing protected value unencrypted");
                    Envelope::plain(value)
                }
                (ProtectionLevel::Plain, _) => Envelope::plain(value),
            }
        };
        self.backend.put(key, &envelope.encode()?)?;
        self.pending().remove(key);
        Ok(())
    }

    /// Without a data key, a sealed entry must not be replaced.
    fn guard_sealed(&self, key: &str) -> StorageResult<()> {
        let Some(raw) = self.backend.get(key)? else {
            return Ok(());
        };
        if classify(&raw).is_ok_and(|format| format.is_sealed()) {
            warn!(key = %key, "refusing to overwrite sealed entry without data key");
            return Err(StorageError::Unreadable(key.to_string()));
        }
        Ok(())
    }

    /// Reads the value under `key`.
    ///
    /// Returns `Ok(None)` if the key is absent, if the entry fails its
    /// integrity check, or if it does not deserialize into `T`; in the last
    /// two cases the entry is purged. A sealed entry read without a data key
    /// is [`StorageError::Unreadable`] and stays in place. Legacy encodings
    /// are rewritten in the current format. `level` is the protection the
    /// caller expects; a plain entry read as `Protected` is upgraded once a
    /// data key is loaded.
    pub fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        level: ProtectionLevel,
    ) -> StorageResult<Option<T>> {
        let Some(decoded) = self.read_decoded(key)? else {
            return Ok(None);
        };

        let encrypted = self.mode() == StoreMode::Encrypted;
        let needs_rewrite = decoded.legacy.is_some()
            || (encrypted && level == ProtectionLevel::Protected && !decoded.sealed);
        let target = if encrypted && (level == ProtectionLevel::Protected || decoded.sealed) {
            ProtectionLevel::Protected
        } else {
            ProtectionLevel::Plain
        };

        match serde_json::from_value::<T>(decoded.value.clone()) {
            Ok(typed) => {
                if needs_rewrite {
                    self.rewrite(key, decoded.value, target);
                }
                Ok(Some(typed))
            }
            Err(e) => {
                warn!(key = %key, "stored value does not deserialize, purging: {}", e);
                self.backend.delete(key)?;
                self.pending().remove(key);
                Ok(None)
            }
        }
    }

    /// Reads and decodes `key`, purging corrupt entries.
    fn read_decoded(&self, key: &str) -> StorageResult<Option<Decoded>> {
        let Some(raw) = self.backend.get(key)? else {
            return Ok(None);
        };
        self.ensure_key();
        let result = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            migrate(&raw, state.key.as_ref(), key)
        };
        match result {
            Ok(decoded) => Ok(Some(decoded)),
            Err(e) if e.is_corruption() => {
                self.purge(key, &e)?;
                Ok(None)
            }
            Err(e) => {
                debug!(key = %key, "entry unreadable without data key: {}", e);
                Err(StorageError::Unreadable(key.to_string()))
            }
        }
    }

    fn rewrite(&self, key: &str, value: Value, level: ProtectionLevel) {
        match self.write_value(key, value, level) {
            Ok(()) => debug!(key = %key, "re-encoded entry in current format"),
            Err(e) => warn!(key = %key, "could not re-encode entry: {}", e),
        }
    }

    fn purge(&self, key: &str, reason: &CryptoError) -> StorageResult<()> {
        warn!(key = %key, "purging unreadable entry: {}", reason);
        self.backend.delete(key)?;
        self.pending().remove(key);
        Ok(())
    }

    /// Removes `key`. Absent keys are not an error.
    pub fn delete(&self, key: &str) -> StorageResult<()> {
        self.backend.delete(key)?;
        self.pending().remove(key);
        Ok(())
    }

    /// Removes every key in `keys`.
    pub fn delete_many<S: AsRef<str>>(&self, keys: &[S]) -> StorageResult<()> {
        for key in keys {
            self.delete(key.as_ref())?;
        }
        Ok(())
    }

    /// Returns true if something is stored under `key`, readable or not.
    pub fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.backend.get(key)?.is_some())
    }

    /// All user-visible keys.
    pub fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self
            .backend
            .keys()?
            .into_iter()
            .filter(|k| !k.starts_with(META_PREFIX))
            .collect())
    }

    /// User-visible keys starting with `prefix`.
    pub fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }

    // ── Repair ───────────────────────────────────────────────────

    /// Checks a single entry and fixes what can be fixed.
    pub fn repair(&self, key: &str) -> StorageResult<RepairOutcome> {
        let Some(raw) = self.backend.get(key)? else {
            return Ok(RepairOutcome::Missing);
        };
        self.ensure_key();
        let result = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            migrate(&raw, state.key.as_ref(), key)
        };

        match result {
            Ok(decoded) => {
                if decoded.legacy.is_some() {
                    let level = if decoded.sealed {
                        ProtectionLevel::Protected
                    } else {
                        ProtectionLevel::Plain
                    };
                    self.write_value(key, decoded.value, level)?;
                    info!(key = %key, "migrated legacy entry");
                }
                Ok(RepairOutcome::Recovered)
            }
            Err(e) if e.is_corruption() => {
                self.purge(key, &e)?;
                Ok(RepairOutcome::Purged)
            }
            Err(e) => {
                debug!(key = %key, "cannot verify entry: {}", e);
                Ok(RepairOutcome::Unreadable)
            }
        }
    }
}
