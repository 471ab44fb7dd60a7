use moodwave_crypto::DataKey;
use moodwave_storage::{FileKeyStore, KeyStore, MemoryKeyStore, StorageError, UnavailableKeyStore};
use tempfile::TempDir;

#[test]
fn file_key_store_starts_empty() {
    let dir = TempDir::new().unwrap();
    let store = FileKeyStore::new(dir.path().join("data.key"));
    assert!(store.load().unwrap().is_none());
}

#[test]
fn file_key_store_roundtrip() {
    let dir = TempDir::new().unwrap();
    let store = FileKeyStore::new(dir.path().join("keys").join("data.key"));
    let key = DataKey::generate();

    store.save(&key).unwrap();
    assert_eq!(store.load().unwrap(), Some(key.clone()));

    let replacement = DataKey::generate();
    store.save(&replacement).unwrap();
    assert_eq!(store.load().unwrap(), Some(replacement));
}

#[test]
fn file_key_store_leaves_no_temp_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.key");
    FileKeyStore::new(&path).save(&DataKey::generate()).unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());
}

#[cfg(unix)]
#[test]
fn file_key_store_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.key");
    FileKeyStore::new(&path).save(&DataKey::generate()).unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn corrupt_key_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.key");
    std::fs::write(&path, "too short").unwrap();
    let err = FileKeyStore::new(&path).load().unwrap_err();
    assert!(matches!(err, StorageError::KeyStore(_)));
}

#[test]
fn memory_key_store_roundtrip() {
    let store = MemoryKeyStore::new();
    assert!(store.load().unwrap().is_none());
    let key = DataKey::generate();
    store.save(&key).unwrap();
    assert_eq!(store.current(), Some(key));
}

#[test]
fn unavailable_key_store_always_fails() {
    assert!(UnavailableKeyStore.load().is_err());
    assert!(UnavailableKeyStore.save(&DataKey::generate()).is_err());
}
