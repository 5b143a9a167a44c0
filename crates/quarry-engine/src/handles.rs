//! Handle identity and live-handle bookkeeping.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use quarry_core::WaitOutcome;
use quarry_core::wait::{lock, wait_until};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of an issued handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(u64);

impl HandleId {
    /// Allocates a fresh id.
    pub(crate) fn next() -> Self {
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Set of live handles guarded by its own lock, with a condition variable
/// signalled whenever a handle leaves the set.
pub(crate) struct HandleSet<T: ?Sized> {
    kind: &'static str,
    entries: Mutex<HashMap<HandleId, Arc<T>>>,
    released: Condvar,
}

impl<T: ?Sized> HandleSet<T> {
    pub(crate) fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Mutex::new(HashMap::new()),
            released: Condvar::new(),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        self.kind
    }

    pub(crate) fn insert(&self, id: HandleId, entry: Arc<T>) {
        lock(&self.entries).insert(id, entry);
    }

    /// Removes a handle; waiters are woken by [`notify`](Self::notify).
    pub(crate) fn remove(&self, id: HandleId) -> Option<Arc<T>> {
        lock(&self.entries).remove(&id)
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Removes and returns every live handle.
    pub(crate) fn take_all(&self) -> Vec<(HandleId, Arc<T>)> {
        let taken: Vec<_> = lock(&self.entries).drain().collect();
        self.notify();
        taken
    }

    /// Waits until the set is empty or `timeout` elapses.
    pub(crate) fn wait_empty(&self, timeout: Duration) -> WaitOutcome {
        let guard = lock(&self.entries);
        let (_guard, outcome) =
            wait_until(&self.released, guard, timeout, |entries| entries.is_empty());
        outcome
    }

    pub(crate) fn notify(&self) {
        self.released.notify_all();
    }
}

impl<T: ?Sized> fmt::Debug for HandleSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleSet")
            .field("kind", &self.kind)
            .field("live", &self.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
