//! Offline-first sync for Moodwave.
//!
//! Local writes are applied to the [`SecureKeyValueStore`](moodwave_storage::SecureKeyValueStore)
//! immediately and recorded in a durable [`SyncQueue`]. The [`SyncEngine`]
//! replays the queue against the remote service whenever it is online,
//! on a timer or on demand.
//!
//! # Delivery guarantees
//!
//! - At least once: an item leaves the queue only after the remote accepted
//!   it or after `max_retries` failed attempts (the one lossy path, logged
//!   at `warn`).
//! - In order: items are sent one at a time in enqueue order.
//! - One token refresh per unauthorized item; if the refresh fails the
//!   cycle stops and the remaining items wait for the next one.

mod auth;
mod config;
mod engine;
mod error;
mod queue;
mod remote;
mod service;

pub use auth::{AuthTokenProvider, HttpTokenProvider};
pub use config::{
    AuthConfig, SyncConfig, DEFAULT_MAX_RETRIES, DEFAULT_PERIODIC_INTERVAL, DEFAULT_REQUEST_TIMEOUT,
};
pub use engine::{CycleReport, ItemOutcome, NotAttemptedReason, SyncEngine, SyncOutcome, SyncState};
pub use error::{SyncError, SyncResult};
pub use queue::{SyncQueue, SyncQueueItem};
pub use remote::{
    route, HttpSyncEndpoint, Method, RemoteError, RemoteSyncEndpoint, RequestBody, Route,
};
pub use service::LocalDataService;
