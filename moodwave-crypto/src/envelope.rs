//! Versioned storage envelope.
//!
//! Every value the store writes is wrapped in an [`Envelope`]:
//!
//! ```text
//! {"scheme":"plain","version":2,"data":{...}}
//! {"scheme":"sealed","version":2,"cipher":"chacha20poly1305","key_id":"…",
//!  "nonce":"…","digest":"…","ciphertext":"…"}
//! ```
//!
//! Two earlier encodings are still readable and are converted by the pure
//! [`migrate`] function:
//!
//! - **v0 plain**: the bare JSON text of the value, no envelope.
//! - **v1 sealed**: `enc:` followed by base64 of `nonce || ciphertext`,
//!   no digest, no associated data.
//!
//! Anything else is [`CryptoError::UnknownFormat`].

use crate::cipher::{self, SealedData, NONCE_SIZE};
use crate::error::{CryptoError, CryptoResult};
use crate::key::DataKey;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Version written by this build.
pub const CURRENT_VERSION: u8 = 2;

/// Cipher suite identifier for sealed envelopes.
pub const CIPHER_SUITE: &str = "chacha20poly1305";

/// Prefix of the v1 sealed encoding.
pub const LEGACY_SEALED_PREFIX: &str = "enc:";

/// A stored value in the current format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum Envelope {
    /// Unencrypted value.
    Plain { version: u8, data: Value },
    /// Encrypted value with an integrity digest.
    Sealed {
        version: u8,
        cipher: String,
        /// Fingerprint of the data key used.
        key_id: String,
        /// Base64 nonce.
        nonce: String,
        /// Base64 SHA-256 over `version || nonce || ciphertext`.
        digest: String,
        /// Base64 ciphertext including the AEAD tag.
        ciphertext: String,
    },
}

/// Earlier encodings understood by [`migrate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegacyScheme {
    PlainV0,
    SealedV1,
}

/// Result of parsing raw stored text, before any key is applied.
#[derive(Clone, Debug, PartialEq)]
pub enum StoredFormat {
    Current(Envelope),
    LegacyPlain(Value),
    LegacySealed(SealedData),
}

impl StoredFormat {
    /// The legacy scheme, if this is not the current format.
    #[must_use]
    pub fn legacy_scheme(&self) -> Option<LegacyScheme> {
        match self {
            StoredFormat::Current(_) => None,
            StoredFormat::LegacyPlain(_) => Some(LegacyScheme::PlainV0),
            StoredFormat::LegacySealed(_) => Some(LegacyScheme::SealedV1),
        }
    }

    /// Whether reading this value requires a data key.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        matches!(
            self,
            StoredFormat::Current(Envelope::Sealed { .. }) | StoredFormat::LegacySealed(_)
        )
    }
}

/// A successfully decoded value and where it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct Decoded {
    pub value: Value,
    /// Set when the value was read from a legacy encoding and should be
    /// rewritten.
    pub legacy: Option<LegacyScheme>,
    /// Whether the stored form was encrypted.
    pub sealed: bool,
}

fn aad_for(storage_key: &str) -> Vec<u8> {
    format!("moodwave/v{CURRENT_VERSION}/{storage_key}").into_bytes()
}

fn digest_of(version: u8, nonce: &[u8], ciphertext: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([version]);
    hasher.update(nonce);
    hasher.update(ciphertext);
    hasher.finalize().into()
}

fn decode_b64(field: &str, value: &str) -> CryptoResult<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| CryptoError::Encoding(format!("{field}: {e}")))
}

impl Envelope {
    /// Wraps a value without encryption.
    #[must_use]
    pub fn plain(value: Value) -> Self {
        Envelope::Plain {
            version: CURRENT_VERSION,
            data: value,
        }
    }

    /// Encrypts a value, binding it to `storage_key` so it cannot be moved
    /// to another key undetected.
    pub fn seal(key: &DataKey, storage_key: &str, value: &Value) -> CryptoResult<Self> {
        let plaintext = serde_json::to_vec(value)?;
        let sealed = cipher::seal(key, &plaintext, &aad_for(storage_key))?;
        let digest = digest_of(CURRENT_VERSION, &sealed.nonce, &sealed.ciphertext);

        Ok(Envelope::Sealed {
            version: CURRENT_VERSION,
            cipher: CIPHER_SUITE.to_string(),
            key_id: key.fingerprint(),
            nonce: STANDARD.encode(sealed.nonce),
            digest: STANDARD.encode(digest),
            ciphertext: STANDARD.encode(&sealed.ciphertext),
        })
    }

    #[must_use]
    pub fn version(&self) -> u8 {
        match self {
            Envelope::Plain { version, .. } | Envelope::Sealed { version, .. } => *version,
        }
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        matches!(self, Envelope::Sealed { .. })
    }

    /// Serializes the envelope for storage.
    pub fn encode(&self) -> CryptoResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Verifies and opens the envelope.
    ///
    /// For sealed envelopes the digest is checked first, then the key id,
    /// then the AEAD tag.
    pub fn open(&self, key: Option<&DataKey>, storage_key: &str) -> CryptoResult<Value> {
        match self {
            Envelope::Plain { data, .. } => Ok(data.clone()),
            Envelope::Sealed {
                version,
                cipher: suite,
                key_id,
                nonce,
                digest,
                ciphertext,
            } => {
                if suite != CIPHER_SUITE {
                    return Err(CryptoError::UnknownFormat(format!("cipher suite {suite}")));
                }

                let nonce_bytes = decode_b64("nonce", nonce)?;
                let ciphertext = decode_b64("ciphertext", ciphertext)?;
                let stored_digest = decode_b64("digest", digest)?;

                if nonce_bytes.len() != NONCE_SIZE {
                    return Err(CryptoError::InvalidNonceLength {
                        expected: NONCE_SIZE,
                        actual: nonce_bytes.len(),
                    });
                }
                if stored_digest != digest_of(*version, &nonce_bytes, &ciphertext) {
                    return Err(CryptoError::IntegrityMismatch);
                }

                let key = key.ok_or(CryptoError::KeyUnavailable)?;
                let active = key.fingerprint();
                if *key_id != active {
                    return Err(CryptoError::KeyMismatch {
                        expected: active,
                        found: key_id.clone(),
                    });
                }

                let mut nonce = [0u8; NONCE_SIZE];
                nonce.copy_from_slice(&nonce_bytes);
                let plaintext = cipher::open(
                    key,
                    &SealedData { nonce, ciphertext },
                    &aad_for(storage_key),
                )?;
                Ok(serde_json::from_slice(&plaintext)?)
            }
        }
    }
}

/// Field names only a current envelope carries.
const ENVELOPE_FIELDS: [&str; 6] = ["cipher", "key_id", "nonce", "digest", "ciphertext", "data"];

/// Whether `value` is, or was before damage, a current envelope. A damaged
/// envelope must fail strict parsing rather than pass as a v0 plain value.
fn looks_enveloped(value: &Value) -> bool {
    value.as_object().is_some_and(|obj| {
        obj.contains_key("scheme")
            || (obj.contains_key("version")
                && ENVELOPE_FIELDS.iter().any(|field| obj.contains_key(*field)))
    })
}

/// Parses raw stored text into one of the known formats. Pure; no key needed.
///
/// An object carrying `scheme`, or `version` alongside any envelope field,
/// is parsed strictly as an envelope; everything else JSON is v0 plain.
pub fn classify(raw: &str) -> CryptoResult<StoredFormat> {
    if let Some(encoded) = raw.strip_prefix(LEGACY_SEALED_PREFIX) {
        return SealedData::from_base64(encoded)
            .map(StoredFormat::LegacySealed)
            .map_err(|e| CryptoError::UnknownFormat(format!("legacy sealed value: {e}")));
    }

    let value: Value = serde_json::from_str(raw)
        .map_err(|e| CryptoError::UnknownFormat(format!("not JSON: {e}")))?;

    if !looks_enveloped(&value) {
        return Ok(StoredFormat::LegacyPlain(value));
    }

    let version = value
        .get("version")
        .and_then(Value::as_u64)
        .ok_or_else(|| CryptoError::UnknownFormat("envelope without numeric version".into()))?;
    if version != u64::from(CURRENT_VERSION) {
        return Err(CryptoError::UnsupportedVersion(
            u8::try_from(version).unwrap_or(u8::MAX),
        ));
    }

    serde_json::from_value(value)
        .map(StoredFormat::Current)
        .map_err(|e| CryptoError::UnknownFormat(format!("malformed envelope: {e}")))
}

/// Decodes raw stored text under any known format.
///
/// `storage_key` must be the key the value was stored under (current sealed
/// envelopes are bound to it). Legacy results carry `legacy: Some(..)` so
/// the caller can rewrite them with [`Envelope::seal`] or [`Envelope::plain`].
pub fn migrate(raw: &str, key: Option<&DataKey>, storage_key: &str) -> CryptoResult<Decoded> {
    let format = classify(raw)?;
    let legacy = format.legacy_scheme();
    let sealed = format.is_sealed();

    let value = match format {
        StoredFormat::Current(envelope) => envelope.open(key, storage_key)?,
        StoredFormat::LegacyPlain(value) => value,
        StoredFormat::LegacySealed(data) => {
            let key = key.ok_or(CryptoError::KeyUnavailable)?;
            let plaintext = cipher::open(key, &data, &[])?;
            serde_json::from_slice(&plaintext)?
        }
    };

    Ok(Decoded {
        value,
        legacy,
        sealed,
    })
}

/// Produces a v1 (`enc:`) encoding. Only used to exercise migration paths.
pub fn encode_legacy_sealed(key: &DataKey, value: &Value) -> CryptoResult<String> {
    let plaintext = serde_json::to_vec(value)?;
    let sealed = cipher::seal(key, &plaintext, &[])?;
    Ok(format!("{LEGACY_SEALED_PREFIX}{}", sealed.to_base64()))
}
