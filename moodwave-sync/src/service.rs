//! Domain write path: every local mutation is persisted, then queued.

use crate::error::{SyncError, SyncResult};
use crate::queue::SyncQueue;
use moodwave_model::{
    DailyWindow, GeneratedMusic, MoodEntry, SyncAction, SyncPayload, UserPreferences, UserProfile,
};
use moodwave_storage::{ProtectionLevel, SecureKeyValueStore};
use moodwave_types::{EntityId, StorageKey, SyncItemId};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::info;

const PROFILE_LEVEL: ProtectionLevel = ProtectionLevel::Protected;
const MOOD_LEVEL: ProtectionLevel = ProtectionLevel::Protected;
const WINDOW_LEVEL: ProtectionLevel = ProtectionLevel::Plain;
const MUSIC_LEVEL: ProtectionLevel = ProtectionLevel::Plain;

/// Reads and writes domain records and queues their mutations for sync.
///
/// Collections are merged here before the store replaces the whole value.
pub struct LocalDataService {
    store: Arc<SecureKeyValueStore>,
    queue: Arc<SyncQueue>,
}

impl LocalDataService {
    pub fn new(store: Arc<SecureKeyValueStore>, queue: Arc<SyncQueue>) -> Self {
        Self { store, queue }
    }

    /// An entry that exists but cannot be read is an error, never the
    /// default, so a merge cannot replace it.
    fn read_or_default<T: DeserializeOwned + Default>(
        &self,
        key: &str,
        level: ProtectionLevel,
    ) -> SyncResult<T> {
        Ok(self.store.get(key, level)?.unwrap_or_default())
    }

    fn enqueue(&self, payload: SyncPayload, action: SyncAction) -> SyncItemId {
        self.queue.enqueue(payload, action)
    }

    // ── Profile and preferences ──────────────────────────────────

    pub fn user_profile(&self, user_id: &str) -> SyncResult<Option<UserProfile>> {
        Ok(self.store.get(&StorageKey::user_data(user_id), PROFILE_LEVEL)?)
    }

    /// Stores the profile issued at sign-in. Not replicated; the account
    /// service owns it.
    pub fn save_user_profile(&self, profile: &UserProfile) -> SyncResult<()> {
        profile.validate()?;
        self.store
            .set(&StorageKey::user_data(&profile.id), profile, PROFILE_LEVEL)?;
        Ok(())
    }

    /// Replaces the preferences inside the stored profile and queues them.
    pub fn update_preferences(&self, preferences: UserPreferences) -> SyncResult<SyncItemId> {
        preferences.validate()?;
        let key = StorageKey::user_data(&preferences.user_id);
        let mut profile: UserProfile = self
            .store
            .get(&key, PROFILE_LEVEL)?
            .ok_or_else(|| SyncError::NotFound(key.clone()))?;

        profile.preferences = preferences.clone();
        self.store.set(&key, &profile, PROFILE_LEVEL)?;
        Ok(self.enqueue(SyncPayload::UserPreferences(preferences), SyncAction::Update))
    }

    // ── Mood entries ─────────────────────────────────────────────

    pub fn mood_entries(&self, user_id: &str) -> SyncResult<Vec<MoodEntry>> {
        self.read_or_default(&StorageKey::mood_entries(user_id), MOOD_LEVEL)
    }

    pub fn add_mood_entry(&self, entry: MoodEntry) -> SyncResult<SyncItemId> {
        entry.validate()?;
        let key = StorageKey::mood_entries(&entry.user_id);
        let mut entries: Vec<MoodEntry> = self.read_or_default(&key, MOOD_LEVEL)?;

        let action = match entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => {
                *existing = entry.clone();
                SyncAction::Update
            }
            None => {
                entries.push(entry.clone());
                SyncAction::Create
            }
        };
        self.store.set(&key, &entries, MOOD_LEVEL)?;
        Ok(self.enqueue(SyncPayload::MoodEntry(entry), action))
    }

    pub fn update_mood_entry(&self, entry: MoodEntry) -> SyncResult<SyncItemId> {
        entry.validate()?;
        let key = StorageKey::mood_entries(&entry.user_id);
        let mut entries: Vec<MoodEntry> = self.read_or_default(&key, MOOD_LEVEL)?;

        let existing = entries
            .iter_mut()
            .find(|e| e.id == entry.id)
            .ok_or_else(|| SyncError::NotFound(format!("mood entry {}", entry.id)))?;
        *existing = entry.clone();

        self.store.set(&key, &entries, MOOD_LEVEL)?;
        Ok(self.enqueue(SyncPayload::MoodEntry(entry), SyncAction::Update))
    }

    /// Removes an entry. Returns `None` if it did not exist.
    pub fn delete_mood_entry(
        &self,
        user_id: &str,
        entry_id: &EntityId,
    ) -> SyncResult<Option<SyncItemId>> {
        let key = StorageKey::mood_entries(user_id);
        let mut entries: Vec<MoodEntry> = self.read_or_default(&key, MOOD_LEVEL)?;

        let Some(pos) = entries.iter().position(|e| &e.id == entry_id) else {
            return Ok(None);
        };
        let removed = entries.remove(pos);

        self.store.set(&key, &entries, MOOD_LEVEL)?;
        Ok(Some(self.enqueue(SyncPayload::MoodEntry(removed), SyncAction::Delete)))
    }

    // ── Daily window ─────────────────────────────────────────────

    pub fn daily_window(&self, user_id: &str) -> SyncResult<Option<DailyWindow>> {
        Ok(self.store.get(&StorageKey::daily_window(user_id), WINDOW_LEVEL)?)
    }

    pub fn set_daily_window(&self, window: DailyWindow) -> SyncResult<SyncItemId> {
        window.validate()?;
        let key = StorageKey::daily_window(&window.user_id);
        let action = if self.store.contains(&key)? {
            SyncAction::Update
        } else {
            SyncAction::Create
        };

        self.store.set(&key, &window, WINDOW_LEVEL)?;
        Ok(self.enqueue(SyncPayload::DailyWindow(window), action))
    }

    // ── Generated music ──────────────────────────────────────────

    pub fn generated_music(&self, user_id: &str) -> SyncResult<Vec<GeneratedMusic>> {
        self.read_or_default(&StorageKey::generated_music(user_id), MUSIC_LEVEL)
    }

    pub fn music_item(
        &self,
        user_id: &str,
        music_id: &EntityId,
    ) -> SyncResult<Option<GeneratedMusic>> {
        let key = StorageKey::music_item(user_id, &music_id.to_string());
        Ok(self.store.get(&key, MUSIC_LEVEL)?)
    }

    /// Stores track metadata in the collection and under its own key.
    pub fn save_generated_music(&self, music: GeneratedMusic) -> SyncResult<SyncItemId> {
        music.validate()?;
        let key = StorageKey::generated_music(&music.user_id);
        let mut tracks: Vec<GeneratedMusic> = self.read_or_default(&key, MUSIC_LEVEL)?;

        let action = match tracks.iter_mut().find(|t| t.id == music.id) {
            Some(existing) => {
                *existing = music.clone();
                SyncAction::Update
            }
            None => {
                tracks.push(music.clone());
                SyncAction::Create
            }
        };

        self.store.set(&key, &tracks, MUSIC_LEVEL)?;
        self.store.set(
            &StorageKey::music_item(&music.user_id, &music.id.to_string()),
            &music,
            MUSIC_LEVEL,
        )?;
        Ok(self.enqueue(SyncPayload::GeneratedMusic(music), action))
    }

    /// Removes a track from both keys. Returns `None` if it did not exist.
    pub fn delete_generated_music(
        &self,
        user_id: &str,
        music_id: &EntityId,
    ) -> SyncResult<Option<SyncItemId>> {
        let key = StorageKey::generated_music(user_id);
        let mut tracks: Vec<GeneratedMusic> = self.read_or_default(&key, MUSIC_LEVEL)?;
        let item_key = StorageKey::music_item(user_id, &music_id.to_string());

        let removed = match tracks.iter().position(|t| &t.id == music_id) {
            Some(pos) => {
                let removed = tracks.remove(pos);
                self.store.set(&key, &tracks, MUSIC_LEVEL)?;
                Some(removed)
            }
            None => self.store.get(&item_key, MUSIC_LEVEL)?,
        };
        self.store.delete(&item_key)?;

        Ok(removed
            .map(|music| self.enqueue(SyncPayload::GeneratedMusic(music), SyncAction::Delete)))
    }

    // ── Account ──────────────────────────────────────────────────

    /// Deletes every key owned by `user_id` and drops all pending mutations.
    ///
    /// Returns the number of keys removed.
    pub fn delete_account_data(&self, user_id: &str) -> SyncResult<usize> {
        let owned: Vec<String> = self
            .store
            .keys()?
            .into_iter()
            .filter(|key| StorageKey::owned_by(key, user_id))
            .collect();

        self.store.delete_many(&owned)?;
        self.queue.clear();
        info!(removed = owned.len(), "deleted local account data");
        Ok(owned.len())
    }
}
