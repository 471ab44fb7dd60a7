use crate::error::{ModelError, ModelResult};
use chrono::{DateTime, Utc};
use moodwave_types::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lowest accepted mood score.
pub const MIN_MOOD: u8 = 1;

/// Highest accepted mood score.
pub const MAX_MOOD: u8 = 10;

/// Number of minutes in a day; window bounds are `0..MINUTES_PER_DAY`.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

fn require(value: &str, field: &'static str) -> ModelResult<()> {
    if value.trim().is_empty() {
        return Err(ModelError::MissingField(field));
    }
    Ok(())
}

fn check_mood(mood: u8) -> ModelResult<()> {
    if !(MIN_MOOD..=MAX_MOOD).contains(&mood) {
        return Err(ModelError::MoodOutOfRange(mood));
    }
    Ok(())
}

/// User-tunable settings replicated as `user-preferences`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub user_id: String,
    pub reminders_enabled: bool,
    #[serde(default)]
    pub preferred_genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl UserPreferences {
    /// Defaults for a freshly created account.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            reminders_enabled: true,
            preferred_genres: Vec::new(),
            theme: None,
            updated_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        require(&self.user_id, "userId")
    }
}

/// The locally cached account profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub preferences: UserPreferences,
}

impl UserProfile {
    pub fn validate(&self) -> ModelResult<()> {
        require(&self.id, "id")?;
        require(&self.email, "email")?;
        self.preferences.validate()
    }
}

/// A single mood check-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodEntry {
    pub id: EntityId,
    pub user_id: String,
    pub mood: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

impl MoodEntry {
    /// Creates an entry recorded now.
    #[must_use]
    pub fn new(user_id: impl Into<String>, mood: u8) -> Self {
        Self {
            id: EntityId::new(),
            user_id: user_id.into(),
            mood,
            note: None,
            tags: Vec::new(),
            recorded_at: Utc::now(),
        }
    }

    /// Adds a free-text note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn validate(&self) -> ModelResult<()> {
        require(&self.user_id, "userId")?;
        check_mood(self.mood)
    }
}

/// Daily time window, in minutes since local midnight.
///
/// A window whose end is before its start wraps past midnight
/// (e.g. 22:00–06:00).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyWindow {
    pub user_id: String,
    pub start_minute: u16,
    pub end_minute: u16,
    pub timezone: String,
}

impl DailyWindow {
    pub fn validate(&self) -> ModelResult<()> {
        require(&self.user_id, "userId")?;
        require(&self.timezone, "timezone")?;
        if self.start_minute >= MINUTES_PER_DAY || self.end_minute >= MINUTES_PER_DAY {
            return Err(ModelError::InvalidWindow(format!(
                "bounds must be below {MINUTES_PER_DAY}, got {}..{}",
                self.start_minute, self.end_minute
            )));
        }
        if self.start_minute == self.end_minute {
            return Err(ModelError::InvalidWindow("window is empty".to_string()));
        }
        Ok(())
    }

    /// Returns true if `minute` (since local midnight) falls inside the window.
    #[must_use]
    pub fn contains(&self, minute: u16) -> bool {
        if self.start_minute < self.end_minute {
            (self.start_minute..self.end_minute).contains(&minute)
        } else {
            minute >= self.start_minute || minute < self.end_minute
        }
    }

    /// Length of the window in minutes.
    #[must_use]
    pub fn duration_minutes(&self) -> u16 {
        if self.start_minute < self.end_minute {
            self.end_minute - self.start_minute
        } else {
            MINUTES_PER_DAY - self.start_minute + self.end_minute
        }
    }
}

/// Metadata of a generated track. Audio itself is not stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedMusic {
    pub id: EntityId,
    pub user_id: String,
    pub title: String,
    pub mood: u8,
    pub duration_secs: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_uri: Option<String>,
    /// Generator parameters, kept opaque.
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl GeneratedMusic {
    /// Metadata for a track generated now.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        mood: u8,
        duration_secs: u32,
    ) -> Self {
        Self {
            id: EntityId::new(),
            user_id: user_id.into(),
            title: title.into(),
            mood,
            duration_secs,
            file_uri: None,
            parameters: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        require(&self.user_id, "userId")?;
        require(&self.title, "title")?;
        check_mood(self.mood)?;
        if self.duration_secs == 0 {
            return Err(ModelError::InvalidMusic("duration must be positive".to_string()));
        }
        Ok(())
    }
}
