//! The index event queue.

use std::path::PathBuf;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use quarry_core::wait::{lock, wait_until};
use quarry_core::{EngineConfig, Result, WaitOutcome};

use crate::item::QueueItem;
use crate::store::{MemoryStore, QueueStore, RedbStore};

/// Config key naming the redb file; absent means an in-memory queue.
pub const QUEUE_PATH_KEY: &str = "queuepath";

/// Coarse queue status reported in engine status snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    /// The queue was shut down.
    Shutdown = 0,
    /// No events pending.
    Idle = 1,
    /// Events waiting to be indexed.
    Pending = 2,
}

impl QueueStatus {
    /// Numeric status code.
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Default)]
struct PollState {
    /// Set by `save_item`/`poll_now`, consumed by `wait_for_poll`.
    signalled: bool,
    shutdown: bool,
}

/// Durable, ordered queue of pending index events.
///
/// Delivery order is ascending queue id. `load_items` remembers the highest
/// id it returned and resumes after it, so an item is delivered at most once
/// until [`reset_position`](Self::reset_position) is called.
pub struct IndexQueue {
    store: Box<dyn QueueStore>,
    position: Mutex<u64>,
    poll: Mutex<PollState>,
    poll_signal: Condvar,
}

impl IndexQueue {
    /// Creates a queue over the given store.
    pub fn new(store: Box<dyn QueueStore>) -> Self {
        Self {
            store,
            position: Mutex::new(0),
            poll: Mutex::new(PollState::default()),
            poll_signal: Condvar::new(),
        }
    }

    /// Creates an in-memory queue.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }

    /// Creates a queue from engine configuration.
    ///
    /// Uses a redb file when `queuepath` is set, memory otherwise.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        match config.get(QUEUE_PATH_KEY).map(str::trim) {
            Some(path) if !path.is_empty() => {
                let store = RedbStore::open(&PathBuf::from(path))?;
                Ok(Self::new(Box::new(store)))
            }
            _ => Ok(Self::in_memory()),
        }
    }

    /// Name of the backing store.
    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Loads up to `count` items (0 = unlimited) after the current position.
    pub fn load_items(&self, count: usize) -> Result<Vec<QueueItem>> {
        let mut position = lock(&self.position);
        let items = self.store.load_after(*position, count)?;
        if let Some(last) = items.last() {
            *position = last.queue_id;
        }
        log::trace!("Loaded {} index events, position {}", items.len(), *position);
        Ok(items)
    }

    /// Rewinds the load position so remaining items are delivered again.
    pub fn reset_position(&self) {
        *lock(&self.position) = 0;
    }

    /// Stores an item and wakes the poller; returns the assigned id.
    pub fn save_item(&self, item: QueueItem) -> Result<u64> {
        let id = self.store.insert(item)?;
        log::debug!("Queued index event {id}");
        self.signal();
        Ok(id)
    }

    /// Removes items by queue id.
    pub fn delete_items(&self, ids: &[u64]) -> Result<usize> {
        self.store.remove(ids)
    }

    /// Removes all items for one content item.
    pub fn delete_id_items(&self, content_id: i32) -> Result<usize> {
        self.store
            .remove_where(&|item: &QueueItem| item.content_id == content_id)
    }

    /// Removes all items for one content type.
    pub fn delete_type_id_items(&self, content_type_id: i64) -> Result<usize> {
        self.store
            .remove_where(&|item: &QueueItem| item.content_type_id == content_type_id)
    }

    /// Removes every item.
    pub fn delete_all_items(&self) -> Result<usize> {
        let removed = self.store.clear()?;
        log::info!("Purged {removed} index events");
        Ok(removed)
    }

    /// Number of pending items.
    pub fn event_count(&self) -> Result<usize> {
        self.store.len()
    }

    /// Wakes a waiting poller immediately.
    pub fn poll_now(&self) {
        self.signal();
    }

    /// Blocks until new work is signalled, `timeout` elapses, or the queue
    /// shuts down.
    pub fn wait_for_poll(&self, timeout: Duration) -> WaitOutcome {
        let guard = lock(&self.poll);
        let (mut state, outcome) = wait_until(&self.poll_signal, guard, timeout, |state| {
            state.signalled || state.shutdown
        });
        if state.shutdown {
            return WaitOutcome::Cancelled;
        }
        state.signalled = false;
        outcome
    }

    /// Shuts the queue down and releases any waiting poller.
    pub fn shutdown(&self) {
        lock(&self.poll).shutdown = true;
        self.poll_signal.notify_all();
        log::info!("Index queue shut down");
    }

    /// Returns `true` after [`shutdown`](Self::shutdown).
    pub fn is_shutdown(&self) -> bool {
        lock(&self.poll).shutdown
    }

    /// Current queue status.
    pub fn status(&self) -> QueueStatus {
        if self.is_shutdown() {
            return QueueStatus::Shutdown;
        }
        match self.store.is_empty() {
            Ok(true) => QueueStatus::Idle,
            Ok(false) => QueueStatus::Pending,
            Err(e) => {
                log::warn!("Unable to read index queue length: {e}");
                QueueStatus::Idle
            }
        }
    }

    fn signal(&self) {
        lock(&self.poll).signalled = true;
        self.poll_signal.notify_all();
    }
}

impl std::fmt::Debug for IndexQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexQueue")
            .field("store", &self.store.name())
            .field("position", &*lock(&self.position))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
