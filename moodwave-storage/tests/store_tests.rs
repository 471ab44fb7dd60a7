use base64::{engine::general_purpose::STANDARD, Engine};
use moodwave_crypto::{DataKey, Envelope};
use moodwave_storage::{
    MemoryBackend, MemoryKeyStore, ProtectionLevel, SecureKeyValueStore, StorageError, StoreMode,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use proptest::sample::Index;
use serde_json::{json, Value};
use std::sync::Arc;

fn store() -> SecureKeyValueStore {
    let store = SecureKeyValueStore::open_in_memory();
    store.initialize();
    store
}

fn flip_ciphertext_byte(raw: &str) -> String {
    let mut env: Envelope = serde_json::from_str(raw).unwrap();
    if let Envelope::Sealed { ciphertext, .. } = &mut env {
        let mut bytes = STANDARD.decode(&*ciphertext).unwrap();
        bytes[0] ^= 0x01;
        *ciphertext = STANDARD.encode(bytes);
    } else {
        panic!("expected sealed envelope");
    }
    env.encode().unwrap()
}

// ── Round trips ─────────────────────────────────────────────────

#[test]
fn protected_value_roundtrip() {
    let store = store();
    store
        .set("mood_entries:u1", &json!({"mood": 7}), ProtectionLevel::Protected)
        .unwrap();

    let value: Option<Value> = store.get("mood_entries:u1", ProtectionLevel::Protected).unwrap();
    assert_eq!(value, Some(json!({"mood": 7})));
}

#[test]
fn plain_value_roundtrip() {
    let store = store();
    store
        .set("generated_music:u1", &vec!["a", "b"], ProtectionLevel::Plain)
        .unwrap();

    let value: Option<Vec<String>> = store.get("generated_music:u1", ProtectionLevel::Plain).unwrap();
    assert_eq!(value, Some(vec!["a".to_string(), "b".to_string()]));
}

#[test]
fn protected_value_is_not_stored_in_clear() {
    let store = store();
    store
        .set("user_data:u1", &json!({"email": "someone@example.com"}), ProtectionLevel::Protected)
        .unwrap();

    let raw = store.backend().get("user_data:u1").unwrap().unwrap();
    assert!(raw.contains("\"scheme\":\"sealed\""));
    assert!(!raw.contains("someone@example.com"));
}

#[test]
fn set_replaces_previous_value() {
    let store = store();
    store.set("k", &1, ProtectionLevel::Protected).unwrap();
    store.set("k", &2, ProtectionLevel::Protected).unwrap();
    let value: Option<i32> = store.get("k", ProtectionLevel::Protected).unwrap();
    assert_eq!(value, Some(2));
}

#[test]
fn missing_key_reads_none() {
    let store = store();
    let value: Option<Value> = store.get("nope", ProtectionLevel::Protected).unwrap();
    assert_eq!(value, None);
}

// ── Corruption ──────────────────────────────────────────────────

#[test]
fn tampered_ciphertext_is_purged() {
    let store = store();
    store
        .set("mood_entries:u1", &json!({"mood": 7}), ProtectionLevel::Protected)
        .unwrap();

    let raw = store.backend().get("mood_entries:u1").unwrap().unwrap();
    store
        .backend()
        .put("mood_entries:u1", &flip_ciphertext_byte(&raw))
        .unwrap();

    let first: Option<Value> = store.get("mood_entries:u1", ProtectionLevel::Protected).unwrap();
    assert_eq!(first, None);
    assert!(!store.contains("mood_entries:u1").unwrap());

    let second: Option<Value> = store.get("mood_entries:u1", ProtectionLevel::Protected).unwrap();
    assert_eq!(second, None);
}

proptest! {
    #[test]
    fn any_single_byte_change_never_yields_another_value(
        position in any::<Index>(),
        replacement in 0x20u8..0x7f,
    ) {
        let store = store();
        let original = json!({"mood": 7, "note": "calm"});
        store
            .set("mood_entries:u1", &original, ProtectionLevel::Protected)
            .unwrap();

        let raw = store.backend().get("mood_entries:u1").unwrap().unwrap();
        let mut bytes = raw.into_bytes();
        let at = position.index(bytes.len());
        prop_assume!(bytes[at] != replacement);
        bytes[at] = replacement;
        let damaged = String::from_utf8(bytes).unwrap();
        store.backend().put("mood_entries:u1", &damaged).unwrap();

        for _ in 0..2 {
            let read: Option<Value> =
                store.get("mood_entries:u1", ProtectionLevel::Protected).unwrap();
            prop_assert!(read.is_none() || read.as_ref() == Some(&original), "read {:?}", read);
        }
    }
}

#[test]
fn garbage_entry_is_purged() {
    let store = store();
    store.backend().put("daily_window:u1", "\u{0}\u{1}not json").unwrap();

    let value: Option<Value> = store.get("daily_window:u1", ProtectionLevel::Protected).unwrap();
    assert_eq!(value, None);
    assert!(!store.contains("daily_window:u1").unwrap());
}

#[test]
fn value_moved_to_another_key_is_purged() {
    let store = store();
    store.set("user_data:u1", &json!({"id": "u1"}), ProtectionLevel::Protected).unwrap();
    let raw = store.backend().get("user_data:u1").unwrap().unwrap();
    store.backend().put("user_data:u2", &raw).unwrap();

    let moved: Option<Value> = store.get("user_data:u2", ProtectionLevel::Protected).unwrap();
    assert_eq!(moved, None);
    assert!(!store.contains("user_data:u2").unwrap());

    let original: Option<Value> = store.get("user_data:u1", ProtectionLevel::Protected).unwrap();
    assert_eq!(original, Some(json!({"id": "u1"})));
}

#[test]
fn type_mismatch_is_purged() {
    let store = store();
    store.set("k", &json!({"mood": "high"}), ProtectionLevel::Plain).unwrap();

    let value: Option<u32> = store.get("k", ProtectionLevel::Plain).unwrap();
    assert_eq!(value, None);
    assert!(!store.contains("k").unwrap());
}

#[test]
fn future_envelope_version_is_purged() {
    let store = store();
    store
        .backend()
        .put("k", r#"{"scheme":"plain","version":9,"data":1}"#)
        .unwrap();

    let value: Option<Value> = store.get("k", ProtectionLevel::Plain).unwrap();
    assert_eq!(value, None);
    assert!(!store.contains("k").unwrap());
}

// ── Protection upgrades ─────────────────────────────────────────

#[test]
fn plain_entry_read_as_protected_is_upgraded() {
    let store = store();
    store.set("k", &json!({"a": 1}), ProtectionLevel::Plain).unwrap();

    let value: Option<Value> = store.get("k", ProtectionLevel::Protected).unwrap();
    assert_eq!(value, Some(json!({"a": 1})));

    let raw = store.backend().get("k").unwrap().unwrap();
    assert!(raw.contains("\"scheme\":\"sealed\""));
}

#[test]
fn sealed_entry_read_as_plain_stays_sealed() {
    let store = store();
    store.set("k", &json!({"a": 1}), ProtectionLevel::Protected).unwrap();

    let value: Option<Value> = store.get("k", ProtectionLevel::Plain).unwrap();
    assert_eq!(value, Some(json!({"a": 1})));

    let raw = store.backend().get("k").unwrap().unwrap();
    assert!(raw.contains("\"scheme\":\"sealed\""));
}

// ── Deletion and listing ────────────────────────────────────────

#[test]
fn delete_is_idempotent() {
    let store = store();
    store.set("k", &1, ProtectionLevel::Plain).unwrap();
    store.delete("k").unwrap();
    store.delete("k").unwrap();
    store.delete("never-existed").unwrap();
    let value: Option<i32> = store.get("k", ProtectionLevel::Plain).unwrap();
    assert_eq!(value, None);
}

#[test]
fn delete_many_removes_all() {
    let store = store();
    for key in ["a", "b", "c"] {
        store.set(key, &key, ProtectionLevel::Plain).unwrap();
    }
    store.delete_many(&["a", "c", "missing"]).unwrap();
    assert_eq!(store.keys().unwrap(), vec!["b".to_string()]);
}

#[test]
fn keys_with_prefix_filters() {
    let store = store();
    store.set("generated_music:u1", &json!([]), ProtectionLevel::Plain).unwrap();
    store.set("mood_entries:u1", &json!([]), ProtectionLevel::Protected).unwrap();
    store.set("mood_entries:u2", &json!([]), ProtectionLevel::Protected).unwrap();

    let keys = store.keys_with_prefix("mood_entries:").unwrap();
    assert_eq!(
        keys,
        vec!["mood_entries:u1".to_string(), "mood_entries:u2".to_string()]
    );
}

#[test]
fn reserved_keys_are_rejected() {
    let store = store();
    let err = store
        .set("__meta__:key_id", &"forged", ProtectionLevel::Plain)
        .unwrap_err();
    assert!(matches!(err, StorageError::ReservedKey(_)));
}

// ── Key lifecycle ───────────────────────────────────────────────

#[test]
fn key_is_generated_once_and_reused() {
    let backend = Arc::new(MemoryBackend::new());
    let keystore = Arc::new(MemoryKeyStore::new());

    let first = SecureKeyValueStore::new(backend.clone(), keystore.clone());
    first.initialize();
    assert_eq!(first.mode(), StoreMode::Encrypted);
    first.set("k", &42, ProtectionLevel::Protected).unwrap();
    let fingerprint = first.key_fingerprint();
    assert!(fingerprint.is_some());
    assert_eq!(keystore.current().map(|k| k.fingerprint()), fingerprint);

    let second = SecureKeyValueStore::new(backend, keystore);
    second.initialize();
    assert_eq!(second.key_fingerprint(), fingerprint);
    let value: Option<i32> = second.get("k", ProtectionLevel::Protected).unwrap();
    assert_eq!(value, Some(42));
}

#[test]
fn entries_sealed_under_a_replaced_key_are_purged() {
    let backend = Arc::new(MemoryBackend::new());

    let old = SecureKeyValueStore::new(
        backend.clone(),
        Arc::new(MemoryKeyStore::with_key(DataKey::generate())),
    );
    old.initialize();
    old.set("mood_entries:u1", &json!([1]), ProtectionLevel::Protected).unwrap();
    old.set("generated_music:u1", &json!([2]), ProtectionLevel::Plain).unwrap();

    let new = SecureKeyValueStore::new(
        backend,
        Arc::new(MemoryKeyStore::with_key(DataKey::generate())),
    );
    new.initialize();

    let sealed: Option<Value> = new.get("mood_entries:u1", ProtectionLevel::Protected).unwrap();
    assert_eq!(sealed, None);
    assert!(!new.contains("mood_entries:u1").unwrap());

    let plain: Option<Value> = new.get("generated_music:u1", ProtectionLevel::Plain).unwrap();
    assert_eq!(plain, Some(json!([2])));
}
