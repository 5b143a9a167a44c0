//! Queued index events.

use std::collections::BTreeMap;

use quarry_core::SearchKey;
use serde::{Deserialize, Serialize};

/// Change to apply to the index for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum IndexEvent {
    /// Submit (insert or replace) a unit's text fields.
    Update {
        /// Unit to index.
        key: SearchKey,
        /// Field values.
        #[serde(default)]
        fields: BTreeMap<String, String>,
    },
    /// Remove a unit and its child rows.
    Delete {
        /// Unit to remove.
        key: SearchKey,
    },
}

impl IndexEvent {
    /// Unit the event applies to.
    pub fn key(&self) -> &SearchKey {
        match self {
            Self::Update { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// A persisted index event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Position in the queue; 0 until saved.
    pub queue_id: u64,
    /// Content id of the affected item.
    pub content_id: i32,
    /// Content type of the affected item.
    pub content_type_id: i64,
    /// The event payload.
    pub event: IndexEvent,
}

impl QueueItem {
    /// Creates an unsaved item for an event.
    pub fn new(event: IndexEvent) -> Self {
        let key = event.key();
        Self {
            queue_id: 0,
            content_id: key.content_id(),
            content_type_id: key.content_type_id(),
            event,
        }
    }

    /// Update event shortcut.
    pub fn update(key: SearchKey, fields: BTreeMap<String, String>) -> Self {
        Self::new(IndexEvent::Update { key, fields })
    }

    /// Delete event shortcut.
    pub fn delete(key: SearchKey) -> Self {
        Self::new(IndexEvent::Delete { key })
    }

    /// Returns `true` once the queue assigned an id.
    pub fn is_saved(&self) -> bool {
        self.queue_id != 0
    }
}
