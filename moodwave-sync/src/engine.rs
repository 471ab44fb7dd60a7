//! Sync engine: drains the queue against the remote endpoint.
//!
//! # State machine
//!
//! ```text
//! Idle ──(timer / force_sync_now, online)──▶ Syncing ──(snapshot done)──▶ Idle
//! any ──(connectivity lost)──▶ Offline ──(connectivity restored)──▶ Idle
//! ```
//!
//! At most one cycle runs at a time; a trigger while `Syncing` returns
//! [`SyncOutcome::NotAttempted`]. Items are sent one at a time in enqueue
//! order so that mutations of the same entity reach the remote in the order
//! they were made.

use crate::auth::AuthTokenProvider;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::queue::{SyncQueue, SyncQueueItem};
use crate::remote::{RemoteError, RemoteSyncEndpoint};
use chrono::{DateTime, Utc};
use moodwave_types::Clock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Observable engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
    Offline,
}

/// Why a cycle did not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotAttemptedReason {
    Offline,
    AlreadySyncing,
}

/// What happened to one item during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Applied remotely and removed.
    Synced,
    /// Failed; retry count raised to the contained value.
    Retried(u32),
    /// Failed for the last time and discarded.
    Dropped,
    /// Token refresh failed; the item is untouched and the cycle stops.
    AuthAborted,
}

/// Per-cycle counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Items sent to the remote (refresh retries not counted twice).
    pub attempted: usize,
    pub succeeded: usize,
    pub retried: usize,
    pub dropped: usize,
    /// Whether the cycle stopped early after a failed token refresh.
    pub aborted: bool,
}

/// Result of a sync trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Precondition failed before the queue was read.
    NotAttempted(NotAttemptedReason),
    /// The queue was not empty but no bearer token is available.
    NoToken,
    /// Every snapshotted item was attempted.
    Completed(CycleReport),
    /// Token refresh failed; remaining items stay queued for the next cycle.
    Aborted(CycleReport),
}

impl SyncOutcome {
    /// True if the cycle attempted its whole snapshot.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Completed(_))
    }

    #[must_use]
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            SyncOutcome::Completed(report) | SyncOutcome::Aborted(report) => Some(report),
            SyncOutcome::NotAttempted(_) | SyncOutcome::NoToken => None,
        }
    }
}

/// Marks the engine as syncing for the lifetime of the guard.
struct CycleGuard<'a> {
    syncing: &'a AtomicBool,
}

impl<'a> CycleGuard<'a> {
    fn acquire(syncing: &'a AtomicBool) -> Option<Self> {
        syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { syncing })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.syncing.store(false, Ordering::Release);
    }
}

struct EngineInner {
    queue: Arc<SyncQueue>,
    remote: Arc<dyn RemoteSyncEndpoint>,
    auth: Arc<dyn AuthTokenProvider>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
    online: AtomicBool,
    syncing: AtomicBool,
    /// Millis of the last completed cycle; 0 if none.
    last_synced_at: AtomicU64,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Drains the [`SyncQueue`] against a [`RemoteSyncEndpoint`].
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Creates an engine that considers itself online.
    pub fn new(
        queue: Arc<SyncQueue>,
        remote: Arc<dyn RemoteSyncEndpoint>,
        auth: Arc<dyn AuthTokenProvider>,
        clock: Arc<dyn Clock>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                queue,
                remote,
                auth,
                clock,
                max_retries: config.max_retries.max(1),
                online: AtomicBool::new(true),
                syncing: AtomicBool::new(false),
                last_synced_at: AtomicU64::new(0),
                timer: Mutex::new(None),
            }),
        }
    }

    // ── Status ───────────────────────────────────────────────────

    #[must_use]
    pub fn state(&self) -> SyncState {
        if !self.is_online() {
            SyncState::Offline
        } else if self.is_syncing() {
            SyncState::Syncing
        } else {
            SyncState::Idle
        }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.inner.syncing.load(Ordering::Acquire)
    }

    /// Number of pending mutations.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.inner.queue.size()
    }

    /// When a cycle last completed.
    #[must_use]
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        match self.inner.last_synced_at.load(Ordering::Acquire) {
            0 => None,
            millis => DateTime::from_timestamp_millis(i64::try_from(millis).ok()?),
        }
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.inner.max_retries
    }

    /// Records a connectivity change reported by the platform.
    pub fn set_connectivity(&self, online: bool) {
        let was_online = self.inner.online.swap(online, Ordering::AcqRel);
        match (was_online, online) {
            (true, false) => info!("connectivity lost, sync paused"),
            (false, true) => info!("connectivity restored"),
            _ => {}
        }
    }

    // ── Triggers ─────────────────────────────────────────────────

    /// Runs one cycle now.
    pub async fn force_sync_now(&self) -> SyncOutcome {
        self.inner.run_cycle().await
    }

    /// Starts the background timer, replacing any running one.
    ///
    /// The first cycle runs one `interval` from now. Must be called from
    /// within a Tokio runtime.
    pub fn start_periodic(&self, interval: Duration) -> SyncResult<()> {
        if interval.is_zero() {
            return Err(SyncError::Config(
                "periodic interval must be non-zero".to_string(),
            ));
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| SyncError::Runtime(e.to_string()))?;

        let inner = Arc::clone(&self.inner);
        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                // Detached so stopping the timer never cancels a running cycle.
                let inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    let outcome = inner.run_cycle().await;
                    debug!(?outcome, "periodic sync finished");
                });
            }
        });

        let mut timer = self.inner.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = timer.replace(task) {
            previous.abort();
        }
        info!("periodic sync every {}s", interval.as_secs());
        Ok(())
    }

    /// Stops the background timer. An in-flight cycle runs to completion.
    pub fn stop_periodic(&self) {
        let mut timer = self.inner.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = timer.take() {
            task.abort();
            info!("periodic sync stopped");
        }
    }

    #[must_use]
    pub fn is_periodic_running(&self) -> bool {
        self.inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl EngineInner {
    async fn run_cycle(&self) -> SyncOutcome {
        if !self.online.load(Ordering::Acquire) {
            debug!("offline, sync not attempted");
            return SyncOutcome::NotAttempted(NotAttemptedReason::Offline);
        }
        let Some(_guard) = CycleGuard::acquire(&self.syncing) else {
            debug!("sync already in progress");
            return SyncOutcome::NotAttempted(NotAttemptedReason::AlreadySyncing);
        };

        let snapshot = self.queue.peek_all();
        if snapshot.is_empty() {
            self.mark_synced();
            return SyncOutcome::Completed(CycleReport::default());
        }

        let Some(mut token) = self.auth.get_token().await else {
            info!(pending = snapshot.len(), "no auth token, sync not attempted");
            return SyncOutcome::NoToken;
        };

        let mut report = CycleReport::default();
        for snapshotted in snapshot {
            // Items removed since the snapshot (e.g. account deletion) are skipped.
            let Some(item) = self.queue.get(&snapshotted.id) else {
                continue;
            };

            match self.process_item(&item, &mut token).await {
                ItemOutcome::Synced => report.succeeded += 1,
                ItemOutcome::Retried(_) => report.retried += 1,
                ItemOutcome::Dropped => report.dropped += 1,
                ItemOutcome::AuthAborted => {
                    report.aborted = true;
                    break;
                }
            }
            report.attempted += 1;
        }

        if report.aborted {
            warn!(
                attempted = report.attempted,
                remaining = self.queue.size(),
                "sync cycle aborted after failed token refresh"
            );
            return SyncOutcome::Aborted(report);
        }

        self.mark_synced();
        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            retried = report.retried,
            dropped = report.dropped,
            "sync cycle complete"
        );
        SyncOutcome::Completed(report)
    }

    async fn process_item(&self, item: &SyncQueueItem, token: &mut String) -> ItemOutcome {
        match self.remote.apply(item, token).await {
            Ok(()) => self.on_success(item),
            Err(RemoteError::Unauthorized) => {
                debug!(item_id = %item.id, "unauthorized, refreshing token");
                if let Err(e) = self.auth.refresh_token().await {
                    warn!(item_id = %item.id, "token refresh failed: {}", e);
                    return ItemOutcome::AuthAborted;
                }
                let Some(fresh) = self.auth.get_token().await else {
                    warn!(item_id = %item.id, "token refresh returned no token");
                    return ItemOutcome::AuthAborted;
                };
                *token = fresh;

                match self.remote.apply(item, token).await {
                    Ok(()) => self.on_success(item),
                    Err(e) => self.on_failure(item, &e),
                }
            }
            Err(e) => self.on_failure(item, &e),
        }
    }

    fn on_success(&self, item: &SyncQueueItem) -> ItemOutcome {
        self.queue.remove(&item.id);
        debug!(item_id = %item.id, "sync item applied");
        ItemOutcome::Synced
    }

    fn on_failure(&self, item: &SyncQueueItem, error: &RemoteError) -> ItemOutcome {
        let retry_count = item.retry_count.saturating_add(1);
        if retry_count >= self.max_retries {
            self.queue.remove(&item.id);
            warn!(
                item_id = %item.id,
                entity_type = %item.entity_type(),
                action = %item.action,
                retry_count,
                "dropping sync item after repeated failures: {}",
                error
            );
            return ItemOutcome::Dropped;
        }

        self.queue.update_retry(&item.id, retry_count);
        debug!(item_id = %item.id, retry_count, "sync item failed: {}", error);
        ItemOutcome::Retried(retry_count)
    }

    fn mark_synced(&self) {
        self.last_synced_at
            .store(self.clock.now_millis().max(1), Ordering::Release);
    }
}
