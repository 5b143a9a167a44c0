//! Search configuration administration.
//!
//! A [`SearchAdmin`] is obtained from
//! [`SearchEngine::search_admin`](crate::SearchEngine::search_admin). A locked
//! admin holds the process-wide admin lock until it is released or dropped;
//! only a locked admin may change configuration.

use std::fmt;
use std::sync::{Arc, Weak};

use quarry_core::{Error, Result};

use crate::content_type::{ContentTypeRegistry, FieldRetriever, ItemDefinition};
use crate::engine::SearchEngine;
use crate::handles::HandleId;

/// Backend side of an admin session.
pub trait AdminBackend: Send {
    /// Applies a content-type definition. Returns `true` when the type's
    /// index must be rebuilt. `notify == false` defers any engine reaction
    /// until a later notifying call.
    fn update(&mut self, definition: &ItemDefinition, notify: bool) -> Result<bool>;

    /// Persists accumulated configuration changes.
    fn save(&mut self) -> Result<()>;

    /// Reconciles stored indexes with the known content types.
    fn verify(&mut self, known_content_types: &[i64]) -> Result<()>;

    /// Rebuilds indexes; returns the ids actually processed.
    fn rebuild_indexes(&mut self, content_types: &[i64]) -> Result<Vec<i64>>;

    /// Optimizes indexes; returns the ids actually processed.
    fn optimize_indexes(&mut self, content_types: &[i64]) -> Result<Vec<i64>>;

    /// Removes configuration for one content type, or all when `None`.
    fn delete(&mut self, content_type_id: Option<i64>) -> Result<()>;

    /// Returns and clears a pending request for an engine restart.
    fn take_restart_request(&mut self) -> bool {
        false
    }
}

/// An admin session issued by the engine.
pub struct SearchAdmin {
    id: HandleId,
    locked: bool,
    released: bool,
    backend: Box<dyn AdminBackend>,
    content_types: Arc<ContentTypeRegistry>,
    engine: Weak<SearchEngine>,
}

impl SearchAdmin {
    pub(crate) fn new(
        id: HandleId,
        locked: bool,
        backend: Box<dyn AdminBackend>,
        content_types: Arc<ContentTypeRegistry>,
        engine: Weak<SearchEngine>,
    ) -> Self {
        Self {
            id,
            locked,
            released: false,
            backend,
            content_types,
            engine,
        }
    }

    /// Identifier of this session.
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Returns `true` if this session holds the admin lock.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    fn ensure_locked(&self) -> Result<()> {
        if self.locked {
            Ok(())
        } else {
            Err(Error::illegal_state(format!(
                "Search admin {} was not obtained locked and is read-only",
                self.id
            )))
        }
    }

    /// Caches a definition and its retriever, then applies it.
    ///
    /// Returns whether the type needs a full reindex. Batch callers pass
    /// `notify == false` for all but the last definition.
    pub fn update(
        &mut self,
        definition: ItemDefinition,
        retriever: Option<Arc<dyn FieldRetriever>>,
        notify: bool,
    ) -> Result<bool> {
        self.ensure_locked()?;
        let content_type_id = definition.content_type_id;
        self.content_types.register(definition.clone(), retriever);
        let reindex = self.backend.update(&definition, notify)?;
        log::info!("Updated search configuration for content type {content_type_id} (reindex: {reindex})");
        if notify {
            self.restart_if_requested()?;
        }
        Ok(reindex)
    }

    /// Persists configuration changes.
    pub fn save(&mut self) -> Result<()> {
        self.ensure_locked()?;
        self.backend.save()?;
        self.restart_if_requested()
    }

    /// Reconciles backend storage with the currently known content types.
    pub fn verify(&mut self, known_content_types: &[i64]) -> Result<()> {
        self.ensure_locked()?;
        self.backend.verify(known_content_types)
    }

    /// Rebuilds the given indexes; invalid ids are omitted from the result.
    pub fn rebuild_indexes(&mut self, content_types: &[i64]) -> Result<Vec<i64>> {
        self.ensure_locked()?;
        let processed = self.backend.rebuild_indexes(content_types)?;
        log::info!("Rebuilt {} of {} indexes", processed.len(), content_types.len());
        Ok(processed)
    }

    /// Optimizes the given indexes; invalid ids are omitted from the result.
    pub fn optimize_indexes(&mut self, content_types: &[i64]) -> Result<Vec<i64>> {
        self.ensure_locked()?;
        self.backend.optimize_indexes(content_types)
    }

    /// Forgets one content type, or all when `None`.
    ///
    /// Indexed data stays until cleared through an indexer.
    pub fn delete(&mut self, content_type_id: Option<i64>) -> Result<()> {
        self.ensure_locked()?;
        let removed = self.content_types.remove(content_type_id);
        log::debug!("Removed {removed} cached content type definitions");
        self.backend.delete(content_type_id)
    }

    /// Retriever cached by the last [`update`](Self::update) of a type.
    pub fn field_retriever(&self, content_type_id: i64) -> Result<Option<Arc<dyn FieldRetriever>>> {
        self.content_types.retriever(content_type_id)
    }

    fn restart_if_requested(&mut self) -> Result<()> {
        if !self.backend.take_restart_request() {
            return Ok(());
        }
        match self.engine.upgrade() {
            Some(engine) => {
                log::info!("Search admin {} restarting the search engine", self.id);
                engine.restart_from_admin()
            }
            None => {
                log::warn!("Restart requested but the search engine is gone");
                Ok(())
            }
        }
    }

    pub(crate) fn mark_released(&mut self) {
        self.released = true;
    }
}

impl Drop for SearchAdmin {
    fn drop(&mut self) {
        if self.locked && !self.released {
            if let Some(engine) = self.engine.upgrade() {
                log::debug!("Search admin {} dropped without release", self.id);
                engine.clear_admin_owner(self.id);
            }
        }
    }
}

impl fmt::Debug for SearchAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchAdmin")
            .field("id", &self.id)
            .field("locked", &self.locked)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
