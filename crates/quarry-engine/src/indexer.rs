//! Indexer contract and the handle the engine issues for it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use quarry_core::{Error, ItemFragment, Result, SearchKey};

use crate::content_type::ContentTypeRegistry;
use crate::handles::HandleId;

/// Backend indexer for one caller session.
///
/// Updates are two-phase: with `commit_now == false` they are staged and
/// become visible to queries on [`commit`](Self::commit),
/// [`commit_all`](Self::commit_all), or a backend-defined automatic commit.
pub trait SearchIndexer: Send + Sync {
    /// Inserts or replaces one unit. Omitted treat-as-binary fields keep
    /// their stored values.
    fn update(&self, key: &SearchKey, fragment: ItemFragment, commit_now: bool) -> Result<()>;

    /// Activates this session's staged changes.
    fn commit(&self) -> Result<()>;

    /// Activates staged changes of every session.
    fn commit_all(&self) -> Result<()>;

    /// Removes units and their child rows; unknown keys are skipped.
    fn delete(&self, keys: &[SearchKey]) -> Result<()>;

    /// Removes all data of one content type, including staged changes.
    fn clear_index(&self, content_type_id: i64) -> Result<()>;

    /// Closes the session, optionally optimizing the index.
    fn close(&self, optimize: bool) -> Result<()>;
}

/// Tracked state of an issued indexer, shared with the engine's live set.
pub(crate) struct IndexerCore {
    pub(crate) id: HandleId,
    pub(crate) indexer: Arc<dyn SearchIndexer>,
    closed: AtomicBool,
}

impl IndexerCore {
    pub(crate) fn new(indexer: Arc<dyn SearchIndexer>) -> Self {
        Self {
            id: HandleId::next(),
            indexer,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Indexer handle issued by [`SearchEngine`](crate::SearchEngine).
///
/// Must be returned with
/// [`release_search_indexer`](crate::SearchEngine::release_search_indexer)
/// exactly once. Fields not defined for the addressed unit, and fields that
/// are not user searchable, are dropped before reaching the backend.
pub struct IndexerHandle {
    core: Arc<IndexerCore>,
    content_types: Arc<ContentTypeRegistry>,
}

impl IndexerHandle {
    pub(crate) fn new(core: Arc<IndexerCore>, content_types: Arc<ContentTypeRegistry>) -> Self {
        Self {
            core,
            content_types,
        }
    }

    /// Identifier of this handle.
    pub fn id(&self) -> HandleId {
        self.core.id
    }

    /// Returns `true` once closed or released.
    pub fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::Closed {
                handle: "SearchIndexer",
            })
        } else {
            Ok(())
        }
    }

    /// Submits one unit.
    pub fn update(&self, key: &SearchKey, mut fragment: ItemFragment, commit_now: bool) -> Result<()> {
        self.ensure_open()?;
        let definition = self
            .content_types
            .definition(key.content_type_id())
            .ok_or(Error::UnknownContentType {
                content_type_id: key.content_type_id(),
            })?;

        fragment.retain(|name| match definition.field_for(key, name) {
            Some(field) => field.user_searchable,
            None => {
                log::debug!("Dropping field '{name}' not defined for {key}");
                false
            }
        });
        self.core.indexer.update(key, fragment, commit_now)
    }

    /// Activates staged changes of this handle.
    pub fn commit(&self) -> Result<()> {
        self.ensure_open()?;
        self.core.indexer.commit()
    }

    /// Activates staged changes of all handles.
    pub fn commit_all(&self) -> Result<()> {
        self.ensure_open()?;
        self.core.indexer.commit_all()
    }

    /// Removes units and their child rows. `None` entries are ignored.
    pub fn delete(&self, keys: &[Option<SearchKey>]) -> Result<()> {
        self.ensure_open()?;
        let keys: Vec<SearchKey> = keys.iter().flatten().cloned().collect();
        if keys.is_empty() {
            return Ok(());
        }
        self.core.indexer.delete(&keys)
    }

    /// Removes all indexed data of one content type.
    pub fn clear_index(&self, content_type_id: i64) -> Result<()> {
        self.ensure_open()?;
        self.core.indexer.clear_index(content_type_id)
    }

    /// Closes the handle. Closing twice is a no-op.
    pub fn close(&self, optimize: bool) -> Result<()> {
        if self.core.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.core.indexer.close(optimize)
    }
}

impl fmt::Debug for IndexerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexerHandle")
            .field("id", &self.core.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
