//! Domain model for Moodwave.
//!
//! Defines the strongly-typed payloads persisted locally and replicated to
//! the remote service:
//! - [`UserProfile`] / [`UserPreferences`]
//! - [`MoodEntry`]
//! - [`DailyWindow`]: the time of day reminders and sessions are scheduled in
//! - [`GeneratedMusic`]: metadata for a generated track
//!
//! and the mutation vocabulary the sync layer speaks:
//! - [`EntityType`] and [`SyncAction`]
//! - [`SyncPayload`]: a tagged union pairing each entity type with its payload

mod entity;
mod error;
mod mutation;

pub use entity::{
    DailyWindow, GeneratedMusic, MoodEntry, UserPreferences, UserProfile, MAX_MOOD, MIN_MOOD,
    MINUTES_PER_DAY,
};
pub use error::{ModelError, ModelResult};
pub use mutation::{EntityType, SyncAction, SyncPayload};
