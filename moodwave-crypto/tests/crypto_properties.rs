//! Property-based tests for the envelope format.
//!
//! - Sealing followed by opening returns the original value
//! - Any single-byte change to the ciphertext or digest is detected

use base64::{engine::general_purpose::STANDARD, Engine};
use moodwave_crypto::{migrate, DataKey, Envelope};
use proptest::prelude::*;
use serde_json::{json, Value};

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,64}".prop_map(Value::from),
        (1u8..=10, "[a-z]{0,16}").prop_map(|(mood, note)| json!({"mood": mood, "note": note})),
        prop::collection::vec(any::<u16>(), 0..32).prop_map(|v| json!(v)),
    ]
}

fn mutate_field(env: &Envelope, field: &str, index: usize, flip: u8) -> Envelope {
    let mut env = env.clone();
    if let Envelope::Sealed {
        digest, ciphertext, ..
    } = &mut env
    {
        let target = if field == "digest" { digest } else { ciphertext };
        let mut bytes = STANDARD.decode(&*target).unwrap();
        let i = index % bytes.len();
        bytes[i] ^= flip;
        *target = STANDARD.encode(bytes);
    }
    env
}

proptest! {
    #[test]
    fn seal_open_roundtrip(value in value_strategy()) {
        let key = DataKey::generate();
        let raw = Envelope::seal(&key, "k", &value).unwrap().encode().unwrap();
        let decoded = migrate(&raw, Some(&key), "k").unwrap();
        prop_assert_eq!(decoded.value, value);
    }

    #[test]
    fn plain_roundtrip(value in value_strategy()) {
        let raw = Envelope::plain(value.clone()).encode().unwrap();
        prop_assert_eq!(migrate(&raw, None, "k").unwrap().value, value);
    }

    #[test]
    fn ciphertext_mutation_detected(
        value in value_strategy(),
        index in any::<usize>(),
        flip in 1u8..=255,
    ) {
        let key = DataKey::generate();
        let env = Envelope::seal(&key, "k", &value).unwrap();
        let tampered = mutate_field(&env, "ciphertext", index, flip);
        prop_assert!(tampered.open(Some(&key), "k").is_err());
    }

    #[test]
    fn digest_mutation_detected(
        value in value_strategy(),
        index in any::<usize>(),
        flip in 1u8..=255,
    ) {
        let key = DataKey::generate();
        let env = Envelope::seal(&key, "k", &value).unwrap();
        let tampered = mutate_field(&env, "digest", index, flip);
        prop_assert!(tampered.open(Some(&key), "k").is_err());
    }
}
