//! Admin sessions of the in-memory backend.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use quarry_core::Result;
use quarry_core::wait::lock;

use super::MemoryShared;
use crate::admin::AdminBackend;
use crate::content_type::ItemDefinition;

pub(super) struct MemoryAdmin {
    shared: Arc<MemoryShared>,
    dirty: bool,
    restart_requested: bool,
}

impl MemoryAdmin {
    pub(super) fn new(shared: Arc<MemoryShared>) -> Self {
        Self {
            shared,
            dirty: false,
            restart_requested: false,
        }
    }

    /// Ids of `requested` that have a definition.
    fn defined(&self, requested: &[i64]) -> Vec<i64> {
        let definitions = lock(&self.shared.definitions);
        let mut ids: Vec<i64> = requested
            .iter()
            .copied()
            .filter(|id| definitions.contains_key(id) || self.shared.content_types.contains(*id))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

impl AdminBackend for MemoryAdmin {
    fn update(&mut self, definition: &ItemDefinition, notify: bool) -> Result<bool> {
        let previous = lock(&self.shared.definitions)
            .insert(definition.content_type_id, definition.clone());
        let changed = previous.as_ref() != Some(definition);
        let reindex = previous.is_some_and(|previous| previous.fields != definition.fields);
        if changed {
            self.dirty = true;
        }
        if reindex {
            log::info!(
                "Content type {} ({}) changed fields and needs reindexing",
                definition.content_type_id,
                definition.name
            );
        }
        if notify && changed && self.shared.settings.restart_on_save {
            self.restart_requested = true;
        }
        Ok(reindex)
    }

    fn save(&mut self) -> Result<()> {
        if let Some(snapshots) = &self.shared.snapshots {
            let definitions = lock(&self.shared.definitions).values().cloned().collect();
            snapshots.save_definitions(definitions)?;
        }
        if self.dirty && self.shared.settings.restart_on_save {
            self.restart_requested = true;
        }
        self.dirty = false;
        Ok(())
    }

    fn verify(&mut self, known_content_types: &[i64]) -> Result<()> {
        let known: BTreeSet<i64> = known_content_types.iter().copied().collect();
        let indexed = self.shared.read_index().content_type_ids();
        for orphan in indexed.difference(&known) {
            log::warn!("Removing index of unknown content type {orphan}");
            self.shared.clear_type(*orphan);
        }
        Ok(())
    }

    fn rebuild_indexes(&mut self, content_types: &[i64]) -> Result<Vec<i64>> {
        let ids = self.defined(content_types);
        for id in &ids {
            let Some(definition) = self.shared.content_types.definition(*id) else {
                continue;
            };
            let pruned = self.shared.write_index().prune_fields(*id, |key, name| {
                definition.field_for(key, name).is_some()
            });
            log::info!("Rebuilt index of content type {id}, dropped {pruned} stale fields");
        }
        Ok(ids)
    }

    fn optimize_indexes(&mut self, content_types: &[i64]) -> Result<Vec<i64>> {
        let ids = self.defined(content_types);
        self.shared.commit_all();
        self.shared
            .optimizations
            .fetch_add(ids.len() as u64, Ordering::Relaxed);
        Ok(ids)
    }

    fn delete(&mut self, content_type_id: Option<i64>) -> Result<()> {
        let mut definitions = lock(&self.shared.definitions);
        match content_type_id {
            Some(id) => {
                if definitions.remove(&id).is_some() {
                    self.dirty = true;
                }
            }
            None => {
                if !definitions.is_empty() {
                    self.dirty = true;
                }
                definitions.clear();
            }
        }
        Ok(())
    }

    fn take_restart_request(&mut self) -> bool {
        std::mem::take(&mut self.restart_requested)
    }
}

// ============================================================================
// Tests
// ============================================================================
