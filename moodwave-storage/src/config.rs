use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const APP_DIR: &str = "moodwave";

/// Where the store keeps its files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database holding the envelopes.
    pub database_path: PathBuf,
    /// File holding the data key. Keep it outside any synced or backed-up
    /// directory.
    pub key_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from(APP_DIR));
        Self {
            database_path: data_dir.join("store.db"),
            key_path: data_dir.join("keys").join("data.key"),
        }
    }
}

impl StoreConfig {
    /// Both files inside `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            database_path: dir.join("store.db"),
            key_path: dir.join("keys").join("data.key"),
        }
    }
}
