//! Mutation vocabulary shared by the local queue and the remote service.

use crate::entity::{DailyWindow, GeneratedMusic, MoodEntry, UserPreferences};
use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of replicated entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityType {
    MoodEntry,
    DailyWindow,
    GeneratedMusic,
    UserPreferences,
}

impl EntityType {
    /// All entity types, in declaration order.
    pub const ALL: [EntityType; 4] = [
        EntityType::MoodEntry,
        EntityType::DailyWindow,
        EntityType::GeneratedMusic,
        EntityType::UserPreferences,
    ];

    /// Wire name (`mood-entry`, ...).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityType::MoodEntry => "mood-entry",
            EntityType::DailyWindow => "daily-window",
            EntityType::GeneratedMusic => "generated-music",
            EntityType::UserPreferences => "user-preferences",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ModelError::Unknown {
                kind: "entity type",
                value: s.to_string(),
            })
    }
}

/// What happened to the entity locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

impl SyncAction {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncAction::Create => "create",
            SyncAction::Update => "update",
            SyncAction::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncAction {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(SyncAction::Create),
            "update" => Ok(SyncAction::Update),
            "delete" => Ok(SyncAction::Delete),
            other => Err(ModelError::Unknown {
                kind: "sync action",
                value: other.to_string(),
            }),
        }
    }
}

/// Data carried by a queued mutation, tagged by entity type.
///
/// Serializes as `{"entityType": "...", "payload": {...}}` so it can be
/// flattened directly into the queue item's wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entityType", content = "payload", rename_all = "kebab-case")]
pub enum SyncPayload {
    MoodEntry(MoodEntry),
    DailyWindow(DailyWindow),
    GeneratedMusic(GeneratedMusic),
    UserPreferences(UserPreferences),
}

impl SyncPayload {
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        match self {
            SyncPayload::MoodEntry(_) => EntityType::MoodEntry,
            SyncPayload::DailyWindow(_) => EntityType::DailyWindow,
            SyncPayload::GeneratedMusic(_) => EntityType::GeneratedMusic,
            SyncPayload::UserPreferences(_) => EntityType::UserPreferences,
        }
    }

    /// Identifier of the remote resource: the record id for collections,
    /// the owning user id for per-user singletons.
    #[must_use]
    pub fn entity_ref(&self) -> String {
        match self {
            SyncPayload::MoodEntry(entry) => entry.id.to_string(),
            SyncPayload::DailyWindow(window) => window.user_id.clone(),
            SyncPayload::GeneratedMusic(music) => music.id.to_string(),
            SyncPayload::UserPreferences(prefs) => prefs.user_id.clone(),
        }
    }

    /// Id of the user that owns the payload.
    #[must_use]
    pub fn user_id(&self) -> &str {
        match self {
            SyncPayload::MoodEntry(entry) => &entry.user_id,
            SyncPayload::DailyWindow(window) => &window.user_id,
            SyncPayload::GeneratedMusic(music) => &music.user_id,
            SyncPayload::UserPreferences(prefs) => &prefs.user_id,
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        match self {
            SyncPayload::MoodEntry(entry) => entry.validate(),
            SyncPayload::DailyWindow(window) => window.validate(),
            SyncPayload::GeneratedMusic(music) => music.validate(),
            SyncPayload::UserPreferences(prefs) => prefs.validate(),
        }
    }
}
