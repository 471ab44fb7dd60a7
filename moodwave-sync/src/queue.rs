//! Durable FIFO log of local mutations awaiting remote application.

use moodwave_model::{EntityType, SyncAction, SyncPayload};
use moodwave_storage::{ProtectionLevel, SecureKeyValueStore, StorageError, StorageResult};
use moodwave_types::{Clock, SyncItemId, SYNC_QUEUE_KEY};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// One pending mutation.
///
/// Persisted as
/// `{"id", "entityType", "payload", "action", "enqueuedAt", "retryCount"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    pub id: SyncItemId,
    #[serde(flatten)]
    pub payload: SyncPayload,
    pub action: SyncAction,
    /// Milliseconds since the Unix epoch.
    pub enqueued_at: u64,
    pub retry_count: u32,
}

impl SyncQueueItem {
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.payload.entity_type()
    }
}

/// Ordered, durable queue of [`SyncQueueItem`]s.
///
/// The log lives in memory and is written through to the secure store as a
/// protected value under `sync_queue` after every change. Mutating
/// operations never fail the caller: a write that cannot be persisted is
/// logged and retried with the next change or [`flush`](Self::flush).
pub struct SyncQueue {
    store: Arc<SecureKeyValueStore>,
    clock: Arc<dyn Clock>,
    items: Mutex<Vec<SyncQueueItem>>,
}

impl SyncQueue {
    /// Loads the persisted queue. A missing or corrupt log starts empty.
    ///
    /// A sealed log that cannot be read because no data key is loaded is
    /// left untouched: the queue starts empty, and new items stay in memory
    /// since the store refuses to overwrite the sealed log.
    pub fn load(store: Arc<SecureKeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        let items = match store.get::<Vec<SyncQueueItem>>(SYNC_QUEUE_KEY, ProtectionLevel::Protected)
        {
            Ok(Some(items)) => {
                debug!("loaded {} pending sync items", items.len());
                items
            }
            Ok(None) => Vec::new(),
            Err(StorageError::Unreadable(_)) => {
                warn!("sync queue is sealed and no data key is loaded; keeping it on disk");
                Vec::new()
            }
            Err(e) => {
                warn!("could not read sync queue, starting empty: {}", e);
                Vec::new()
            }
        };

        Self {
            store,
            clock,
            items: Mutex::new(items),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SyncQueueItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a mutation to the tail and returns its id.
    pub fn enqueue(&self, payload: SyncPayload, action: SyncAction) -> SyncItemId {
        let now = self.clock.now_millis();
        let mut items = self.lock();

        let mut id = SyncItemId::generate(now);
        while items.iter().any(|item| item.id == id) {
            id = SyncItemId::generate(now);
        }

        debug!(
            item_id = %id,
            entity_type = %payload.entity_type(),
            action = %action,
            "enqueued sync item"
        );
        items.push(SyncQueueItem {
            id: id.clone(),
            payload,
            action,
            enqueued_at: now,
            retry_count: 0,
        });
        self.persist(&items);
        id
    }

    /// Point-in-time snapshot in enqueue order.
    #[must_use]
    pub fn peek_all(&self) -> Vec<SyncQueueItem> {
        self.lock().clone()
    }

    /// The item with `id`, if still queued.
    #[must_use]
    pub fn get(&self, id: &SyncItemId) -> Option<SyncQueueItem> {
        self.lock().iter().find(|item| &item.id == id).cloned()
    }

    /// Removes `id`. Returns false if it was not queued.
    pub fn remove(&self, id: &SyncItemId) -> bool {
        let mut items = self.lock();
        let before = items.len();
        items.retain(|item| &item.id != id);
        if items.len() == before {
            return false;
        }
        self.persist(&items);
        true
    }

    /// Sets the retry count of `id` in place.
    ///
    /// Retry counts never decrease; a lower value is ignored. Returns false
    /// if `id` is not queued.
    pub fn update_retry(&self, id: &SyncItemId, retry_count: u32) -> bool {
        let mut items = self.lock();
        let Some(item) = items.iter_mut().find(|item| &item.id == id) else {
            return false;
        };
        if retry_count < item.retry_count {
            debug!(
                item_id = %id,
                current = item.retry_count,
                requested = retry_count,
                "ignoring retry count decrease"
            );
            return true;
        }
        item.retry_count = retry_count;
        self.persist(&items);
        true
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every pending item.
    pub fn clear(&self) {
        let mut items = self.lock();
        if items.is_empty() {
            return;
        }
        info!("clearing {} pending sync items", items.len());
        items.clear();
        self.persist(&items);
    }

    /// Writes the current log to the store.
    pub fn flush(&self) -> StorageResult<()> {
        let items = self.lock();
        self.store
            .set(SYNC_QUEUE_KEY, &*items, ProtectionLevel::Protected)
    }

    fn persist(&self, items: &[SyncQueueItem]) {
        if let Err(e) = self
            .store
            .set(SYNC_QUEUE_KEY, items, ProtectionLevel::Protected)
        {
            warn!("failed to persist sync queue: {}", e);
        }
    }
}
