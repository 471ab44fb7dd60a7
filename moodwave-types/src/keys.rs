//! Storage key namespace.
//!
//! Every record in the local store lives under a fixed, known key built from
//! an entity prefix and the owning user id. The store itself never interprets
//! keys; these builders are the single place the layout is defined.

/// Key of the singleton sync queue record.
pub const SYNC_QUEUE_KEY: &str = "sync_queue";

const USER_DATA: &str = "user_data";
const MOOD_ENTRIES: &str = "mood_entries";
const DAILY_WINDOW: &str = "daily_window";
const GENERATED_MUSIC: &str = "generated_music";

/// Builders for the logical storage keys.
pub struct StorageKey;

impl StorageKey {
    /// `user_data:{user_id}`: the user profile.
    #[must_use]
    pub fn user_data(user_id: &str) -> String {
        format!("{USER_DATA}:{user_id}")
    }

    /// `mood_entries:{user_id}`: every mood entry of a user.
    #[must_use]
    pub fn mood_entries(user_id: &str) -> String {
        format!("{MOOD_ENTRIES}:{user_id}")
    }

    /// `daily_window:{user_id}`: the daily time window.
    #[must_use]
    pub fn daily_window(user_id: &str) -> String {
        format!("{DAILY_WINDOW}:{user_id}")
    }

    /// `generated_music:{user_id}`: the collection of generated tracks.
    #[must_use]
    pub fn generated_music(user_id: &str) -> String {
        format!("{GENERATED_MUSIC}:{user_id}")
    }

    /// `{user_id}:{music_id}`: a single generated track.
    #[must_use]
    pub fn music_item(user_id: &str, music_id: &str) -> String {
        format!("{user_id}:{music_id}")
    }

    /// `sync_queue`.
    #[must_use]
    pub fn sync_queue() -> String {
        SYNC_QUEUE_KEY.to_string()
    }

    /// The fixed per-user keys (single-track keys are matched by
    /// [`StorageKey::owned_by`] instead).
    #[must_use]
    pub fn user_keys(user_id: &str) -> Vec<String> {
        vec![
            Self::user_data(user_id),
            Self::mood_entries(user_id),
            Self::daily_window(user_id),
            Self::generated_music(user_id),
        ]
    }

    /// Returns true if `key` belongs to `user_id` under any pattern.
    #[must_use]
    pub fn owned_by(key: &str, user_id: &str) -> bool {
        if user_id.is_empty() {
            return false;
        }
        if Self::user_keys(user_id).iter().any(|k| k == key) {
            return true;
        }
        // `{user_id}:{music_id}`, but not another prefix that happens to
        // equal the user id.
        match key.split_once(':') {
            Some((owner, rest)) => {
                owner == user_id
                    && !rest.is_empty()
                    && ![USER_DATA, MOOD_ENTRIES, DAILY_WINDOW, GENERATED_MUSIC].contains(&owner)
            }
            None => false,
        }
    }
}
