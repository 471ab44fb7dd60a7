//! Identifier types used throughout the Moodwave core.

use crate::Error;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a domain record (mood entry, generated track).
/// Uses UUID v7 which embeds a timestamp for natural ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Creates a new entity ID with the current timestamp.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates an entity ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parses an entity ID from a string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Length of the random suffix of a [`SyncItemId`].
const SUFFIX_LEN: usize = 8;

/// Width of the zero-padded millisecond prefix of a [`SyncItemId`].
const MILLIS_WIDTH: usize = 13;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Identifier of a pending mutation in the sync queue.
///
/// Formatted as `{millis:013}-{suffix}` where `suffix` is eight random
/// base-36 characters. The zero-padded prefix keeps lexicographic order
/// aligned with creation time; the suffix disambiguates ids minted within
/// the same millisecond.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SyncItemId(String);

impl SyncItemId {
    /// Mints a new id for the given wall-clock time.
    #[must_use]
    pub fn generate(now_millis: u64) -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
            .collect();
        Self(format!("{now_millis:0width$}-{suffix}", width = MILLIS_WIDTH))
    }

    /// Parses and validates an id.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let (millis, suffix) = s
            .split_once('-')
            .ok_or_else(|| Error::InvalidSyncItemId(s.to_string()))?;

        let millis_ok = !millis.is_empty() && millis.bytes().all(|b| b.is_ascii_digit());
        let suffix_ok = suffix.len() == SUFFIX_LEN
            && suffix
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase());

        if !millis_ok || !suffix_ok {
            return Err(Error::InvalidSyncItemId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Milliseconds since the Unix epoch at which the id was minted.
    #[must_use]
    pub fn minted_at(&self) -> u64 {
        self.0
            .split_once('-')
            .and_then(|(millis, _)| millis.parse().ok())
            .unwrap_or(0)
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SyncItemId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SyncItemId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SyncItemId> for String {
    fn from(id: SyncItemId) -> Self {
        id.0
    }
}
