//! Queue storage.
//!
//! A store is an ordered map from auto-incrementing id to [`QueueItem`].
//! [`MemoryStore`] keeps items in process; [`RedbStore`] persists them in a
//! redb database so pending events survive a restart.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use quarry_core::wait::lock;
use quarry_core::{Error, Result};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};

use crate::item::QueueItem;

/// Ordered, id-keyed storage for index events.
pub trait QueueStore: Send + Sync {
    /// Assigns the next id to `item`, stores it, and returns the id.
    fn insert(&self, item: QueueItem) -> Result<u64>;

    /// Items with an id greater than `after`, ascending; `limit` 0 means all.
    fn load_after(&self, after: u64, limit: usize) -> Result<Vec<QueueItem>>;

    /// Removes items by id; returns how many existed.
    fn remove(&self, ids: &[u64]) -> Result<usize>;

    /// Removes every item matching `predicate`.
    fn remove_where(&self, predicate: &dyn Fn(&QueueItem) -> bool) -> Result<usize>;

    /// Removes everything.
    fn clear(&self) -> Result<usize>;

    /// Number of stored items.
    fn len(&self) -> Result<usize>;

    /// Returns `true` if nothing is stored.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Store name for diagnostics.
    fn name(&self) -> &str;
}

// ============================================================================
// MemoryStore
// ============================================================================

#[derive(Debug, Default)]
struct MemoryItems {
    last_id: u64,
    items: BTreeMap<u64, QueueItem>,
}

/// In-process store; contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryItems>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueStore for MemoryStore {
    fn insert(&self, mut item: QueueItem) -> Result<u64> {
        let mut inner = lock(&self.inner);
        inner.last_id += 1;
        let id = inner.last_id;
        item.queue_id = id;
        inner.items.insert(id, item);
        Ok(id)
    }

    fn load_after(&self, after: u64, limit: usize) -> Result<Vec<QueueItem>> {
        let inner = lock(&self.inner);
        let range = inner.items.range(after.saturating_add(1)..).map(|(_, item)| item.clone());
        Ok(if limit == 0 {
            range.collect()
        } else {
            range.take(limit).collect()
        })
    }

    fn remove(&self, ids: &[u64]) -> Result<usize> {
        let mut inner = lock(&self.inner);
        Ok(ids
            .iter()
            .filter(|id| inner.items.remove(id).is_some())
            .count())
    }

    fn remove_where(&self, predicate: &dyn Fn(&QueueItem) -> bool) -> Result<usize> {
        let mut inner = lock(&self.inner);
        let before = inner.items.len();
        inner.items.retain(|_, item| !predicate(item));
        Ok(before - inner.items.len())
    }

    fn clear(&self) -> Result<usize> {
        let mut inner = lock(&self.inner);
        let removed = inner.items.len();
        inner.items.clear();
        Ok(removed)
    }

    fn len(&self) -> Result<usize> {
        Ok(lock(&self.inner).items.len())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// RedbStore
// ============================================================================

const EVENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("index_events");

fn store_error<E>(context: &str) -> impl FnOnce(E) -> Error + '_
where
    E: Into<redb::Error>,
{
    move |e| {
        let e: redb::Error = e.into();
        Error::queue_store(context, e)
    }
}

/// Durable store backed by a redb database file.
///
/// Items are JSON-encoded. Ids continue from the highest stored id when an
/// existing database is reopened.
pub struct RedbStore {
    db: Database,
    last_id: Mutex<u64>,
}

impl RedbStore {
    /// Opens or creates the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path).map_err(store_error("Failed to open queue database"))?;

        let txn = db
            .begin_write()
            .map_err(store_error("Failed to begin transaction"))?;
        let last_id = {
            let table = txn
                .open_table(EVENTS)
                .map_err(store_error("Failed to open event table"))?;
            let last = table
                .last()
                .map_err(store_error("Failed to read last event"))?;
            last.map(|(key, _)| key.value()).unwrap_or(0)
        };
        txn.commit()
            .map_err(store_error("Failed to commit transaction"))?;

        log::info!(
            "Opened index event queue at {} (last id {last_id})",
            path.display()
        );
        Ok(Self {
            db,
            last_id: Mutex::new(last_id),
        })
    }

    fn remove_ids(&self, ids: &[u64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let txn = self
            .db
            .begin_write()
            .map_err(store_error("Failed to begin transaction"))?;
        let mut removed = 0;
        {
            let mut table = txn
                .open_table(EVENTS)
                .map_err(store_error("Failed to open event table"))?;
            for id in ids {
                if table
                    .remove(*id)
                    .map_err(store_error("Failed to remove event"))?
                    .is_some()
                {
                    removed += 1;
                }
            }
        }
        txn.commit()
            .map_err(store_error("Failed to commit transaction"))?;
        Ok(removed)
    }

    fn scan(&self, after: u64, limit: usize) -> Result<Vec<QueueItem>> {
        let txn = self
            .db
            .begin_read()
            .map_err(store_error("Failed to begin read transaction"))?;
        let table = txn
            .open_table(EVENTS)
            .map_err(store_error("Failed to open event table"))?;

        let mut items = Vec::new();
        let range = table
            .range(after.saturating_add(1)..)
            .map_err(store_error("Failed to scan events"))?;
        for entry in range {
            let (_, value) = entry.map_err(store_error("Failed to read event"))?;
            let item: QueueItem = serde_json::from_slice(value.value())?;
            items.push(item);
            if limit > 0 && items.len() >= limit {
                break;
            }
        }
        Ok(items)
    }
}

impl QueueStore for RedbStore {
    fn insert(&self, mut item: QueueItem) -> Result<u64> {
        // Held across the write so ids reach the table in order.
        let mut last_id = lock(&self.last_id);
        let id = *last_id + 1;
        item.queue_id = id;
        let bytes = serde_json::to_vec(&item)?;

        let txn = self
            .db
            .begin_write()
            .map_err(store_error("Failed to begin transaction"))?;
        {
            let mut table = txn
                .open_table(EVENTS)
                .map_err(store_error("Failed to open event table"))?;
            table
                .insert(id, bytes.as_slice())
                .map_err(store_error("Failed to store event"))?;
        }
        txn.commit()
            .map_err(store_error("Failed to commit transaction"))?;

        *last_id = id;
        Ok(id)
    }

    fn load_after(&self, after: u64, limit: usize) -> Result<Vec<QueueItem>> {
        self.scan(after, limit)
    }

    fn remove(&self, ids: &[u64]) -> Result<usize> {
        self.remove_ids(ids)
    }

    fn remove_where(&self, predicate: &dyn Fn(&QueueItem) -> bool) -> Result<usize> {
        let ids: Vec<u64> = self
            .scan(0, 0)?
            .into_iter()
            .filter(|item| predicate(item))
            .map(|item| item.queue_id)
            .collect();
        self.remove_ids(&ids)
    }

    fn clear(&self) -> Result<usize> {
        let ids: Vec<u64> = self.scan(0, 0)?.into_iter().map(|item| item.queue_id).collect();
        self.remove_ids(&ids)
    }

    fn len(&self) -> Result<usize> {
        let txn = self
            .db
            .begin_read()
            .map_err(store_error("Failed to begin read transaction"))?;
        let table = txn
            .open_table(EVENTS)
            .map_err(store_error("Failed to open event table"))?;
        let len = table.len().map_err(store_error("Failed to count events"))?;
        Ok(len as usize)
    }

    fn name(&self) -> &str {
        "redb"
    }
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("db", &"<redb::Database>")
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
