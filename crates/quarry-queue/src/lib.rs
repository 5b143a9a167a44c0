//! Quarry Queue — the ordered index event queue.
//!
//! Content changes are recorded as [`QueueItem`]s and consumed in ascending
//! queue-id order by the indexer. Storage is pluggable through
//! [`QueueStore`]: [`MemoryStore`] for tests and embedded use, [`RedbStore`]
//! for a durable queue that survives restarts.

#![forbid(unsafe_code)]

pub mod item;
pub mod queue;
pub mod store;

mod proptests;

pub use item::{IndexEvent, QueueItem};
pub use queue::{IndexQueue, QUEUE_PATH_KEY, QueueStatus};
pub use store::{MemoryStore, QueueStore, RedbStore};
