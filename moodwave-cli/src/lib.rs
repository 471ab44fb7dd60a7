//! Composition root for the Moodwave storage and sync core.
//!
//! Loads [`AppConfig`], wires the store, queue, engine and data service
//! together, and implements the maintenance commands exposed by the
//! `moodwave` binary.

use anyhow::{Context, Result};
use moodwave_storage::{
    MigrationReport, ProtectionLevel, RepairOutcome, ScanReport, SecureKeyValueStore, StoreConfig,
    StoreMode,
};
use moodwave_sync::{
    AuthConfig, HttpSyncEndpoint, HttpTokenProvider, LocalDataService, NotAttemptedReason,
    SyncConfig, SyncEngine, SyncOutcome, SyncQueue, SyncState,
};
use moodwave_types::{Clock, SystemClock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const APP_DIR: &str = "moodwave";
const CONFIG_FILE: &str = "config.toml";

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub auth: AuthConfig,
}

impl AppConfig {
    /// `{config_dir}/moodwave/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from(APP_DIR))
            .join(CONFIG_FILE)
    }

    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// The wired components.
pub struct App {
    store: Arc<SecureKeyValueStore>,
    queue: Arc<SyncQueue>,
    engine: SyncEngine,
    service: LocalDataService,
    scan: ScanReport,
}

impl App {
    /// Opens the on-disk store and builds the HTTP-backed sync engine.
    pub fn open(config: &AppConfig) -> Result<Self> {
        let store = SecureKeyValueStore::open(&config.store).with_context(|| {
            format!("opening store at {}", config.store.database_path.display())
        })?;
        Self::with_store(Arc::new(store), config)
    }

    /// Builds the application over an existing store.
    pub fn with_store(store: Arc<SecureKeyValueStore>, config: &AppConfig) -> Result<Self> {
        let scan = store.initialize();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let queue = Arc::new(SyncQueue::load(store.clone(), clock.clone()));

        let remote = HttpSyncEndpoint::new(&config.sync).context("building sync client")?;
        let auth =
            HttpTokenProvider::new(&config.auth, &config.sync).context("building auth client")?;
        let engine = SyncEngine::new(
            queue.clone(),
            Arc::new(remote),
            Arc::new(auth),
            clock,
            &config.sync,
        );
        let service = LocalDataService::new(store.clone(), queue.clone());

        Ok(Self {
            store,
            queue,
            engine,
            service,
            scan,
        })
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn service(&self) -> &LocalDataService {
        &self.service
    }

    pub fn store(&self) -> &SecureKeyValueStore {
        &self.store
    }

    // ── Commands ─────────────────────────────────────────────────

    pub fn status(&self) -> StatusReport {
        StatusReport {
            mode: self.store.mode(),
            state: self.engine.state(),
            queue_depth: self.engine.queue_depth(),
            last_synced_at: self.engine.last_synced_at().map(|t| t.to_rfc3339()),
            pending_migrations: self.store.pending_migrations().len(),
            scan: self.scan.clone(),
        }
    }

    pub async fn sync(&self) -> SyncOutcome {
        let outcome = self.engine.force_sync_now().await;
        if let Err(e) = self.queue.flush() {
            tracing::warn!("could not flush sync queue: {}", e);
        }
        outcome
    }

    /// Reads `key` the way a domain service would. With `protected`, a
    /// plain entry is re-encrypted in place when a data key is loaded.
    pub fn get(&self, key: &str, protected: bool) -> Result<Option<Value>> {
        let level = if protected {
            ProtectionLevel::Protected
        } else {
            ProtectionLevel::Plain
        };
        Ok(self.store.get(key, level)?)
    }

    pub fn repair(&self, key: &str) -> Result<RepairOutcome> {
        Ok(self.store.repair(key)?)
    }

    pub fn migrate(&self) -> Result<MigrationReport> {
        let report = self.store.migrate_all()?;
        info!(
            recovered = report.recovered,
            purged = report.purged,
            unreadable = report.unreadable,
            "migration finished"
        );
        Ok(report)
    }

    pub fn purge_user(&self, user_id: &str) -> Result<usize> {
        Ok(self.service.delete_account_data(user_id)?)
    }
}

/// Output of the `status` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub mode: StoreMode,
    pub state: SyncState,
    pub queue_depth: usize,
    pub last_synced_at: Option<String>,
    pub pending_migrations: usize,
    pub scan: ScanReport,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            StoreMode::Uninitialized => "uninitialized",
            StoreMode::Encrypted => "encrypted",
            StoreMode::Degraded => "degraded (unencrypted)",
        };
        let state = match self.state {
            SyncState::Idle => "idle",
            SyncState::Syncing => "syncing",
            SyncState::Offline => "offline",
        };
        writeln!(f, "store mode:         {mode}")?;
        writeln!(f, "sync state:         {state}")?;
        writeln!(f, "pending changes:    {}", self.queue_depth)?;
        writeln!(
            f,
            "last synced:        {}",
            self.last_synced_at.as_deref().unwrap_or("never")
        )?;
        writeln!(f, "pending migrations: {}", self.pending_migrations)?;
        write!(
            f,
            "startup scan:       {} current, {} legacy, {} purged",
            self.scan.current, self.scan.legacy, self.scan.purged
        )
    }
}

/// One-line summary of a sync outcome.
pub fn describe_outcome(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::NotAttempted(NotAttemptedReason::Offline) => {
            "not attempted: offline".to_string()
        }
        SyncOutcome::NotAttempted(NotAttemptedReason::AlreadySyncing) => {
            "not attempted: a sync is already running".to_string()
        }
        SyncOutcome::NoToken => "not attempted: not signed in".to_string(),
        SyncOutcome::Completed(r) => format!(
            "synced: {} attempted, {} succeeded, {} will retry, {} dropped",
            r.attempted, r.succeeded, r.retried, r.dropped
        ),
        SyncOutcome::Aborted(r) => format!(
            "aborted after {} items: authentication could not be renewed",
            r.attempted
        ),
    }
}

pub fn describe_repair(key: &str, outcome: RepairOutcome) -> String {
    match outcome {
        RepairOutcome::Recovered => format!("{key}: ok"),
        RepairOutcome::Purged => format!("{key}: corrupt, removed"),
        RepairOutcome::Unreadable => format!("{key}: sealed, no key available to verify"),
        RepairOutcome::Missing => format!("{key}: not found"),
    }
}
