//! In-memory reference backend.
//!
//! Indexer sessions stage their changes; a commit applies them to the shared
//! index, where queries see them. Staged changes are also committed once a
//! session holds `autocommitthreshold` of them. With `datadir` set, committed
//! documents are written on shutdown and read back on start, and admin saves
//! write the content-type definitions.
//!
//! | Key | Default | Meaning |
//! |-----|---------|---------|
//! | `datadir` | unset | Snapshot directory |
//! | `autocommitthreshold` | 100 | Staged operations per session before an automatic commit |
//! | `restartonsave` | `false` | Ask the engine to restart after an admin save with changes |

mod admin;
mod index;
mod snapshot;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use quarry_core::wait::lock;
use quarry_core::{
    EngineConfig, EngineState, Error, ItemFragment, Result, SearchKey, StatusMessage, StoredValue,
};

use self::admin::MemoryAdmin;
use self::index::{MemoryIndex, StagedOp};
use self::snapshot::SnapshotDir;
use crate::admin::AdminBackend;
use crate::backend::{BackendContext, EngineBackend};
use crate::content_type::{ContentTypeRegistry, ItemDefinition};
use crate::indexer::SearchIndexer;
use crate::query::{QueryRequest, QueryResults, SearchQuery};

/// Config key: snapshot directory.
pub const DATA_DIR_KEY: &str = "datadir";
/// Config key: staged operations per session before an automatic commit.
pub const AUTOCOMMIT_KEY: &str = "autocommitthreshold";
/// Config key: request an engine restart after an admin save with changes.
pub const RESTART_ON_SAVE_KEY: &str = "restartonsave";

const DEFAULT_AUTOCOMMIT_THRESHOLD: usize = 100;

/// Settings of the in-memory backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySettings {
    /// Snapshot directory, if persistence is wanted.
    pub data_dir: Option<PathBuf>,
    /// Staged operations per session before an automatic commit.
    pub autocommit_threshold: usize,
    /// Whether an admin save with changes asks for an engine restart.
    pub restart_on_save: bool,
}

impl MemorySettings {
    /// Reads settings from configuration.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            data_dir: config
                .get(DATA_DIR_KEY)
                .map(str::trim)
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            autocommit_threshold: config
                .get_parsed::<usize>(AUTOCOMMIT_KEY)?
                .unwrap_or(DEFAULT_AUTOCOMMIT_THRESHOLD)
                .max(1),
            restart_on_save: config.get_parsed::<bool>(RESTART_ON_SAVE_KEY)?.unwrap_or(false),
        })
    }
}

struct MemoryShared {
    settings: MemorySettings,
    content_types: Arc<ContentTypeRegistry>,
    snapshots: Option<SnapshotDir>,
    // Lock order: definitions, then staged, then index.
    definitions: Mutex<BTreeMap<i64, ItemDefinition>>,
    staged: Mutex<BTreeMap<u64, Vec<StagedOp>>>,
    index: RwLock<MemoryIndex>,
    started: AtomicBool,
    state_code: AtomicI32,
    next_session: AtomicU64,
    commits: AtomicU64,
    optimizations: AtomicU64,
}

impl MemoryShared {
    fn read_index(&self) -> RwLockReadGuard<'_, MemoryIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, MemoryIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Stages an operation; returns how many the session now holds.
    fn stage(&self, session: u64, op: StagedOp) -> usize {
        let mut staged = lock(&self.staged);
        let ops = staged.entry(session).or_default();
        ops.push(op);
        ops.len()
    }

    fn commit_session(&self, session: u64) {
        let mut staged = lock(&self.staged);
        let Some(ops) = staged.remove(&session) else {
            return;
        };
        let count = ops.len();
        let mut index = self.write_index();
        for op in ops {
            index.apply(op);
        }
        self.commits.fetch_add(1, Ordering::Relaxed);
        log::debug!("Committed {count} staged operations of session {session}");
    }

    fn commit_all(&self) -> usize {
        let mut staged = lock(&self.staged);
        let sessions = std::mem::take(&mut *staged);
        let mut index = self.write_index();
        let mut count = 0;
        for op in sessions.into_values().flatten() {
            index.apply(op);
            count += 1;
        }
        if count > 0 {
            self.commits.fetch_add(1, Ordering::Relaxed);
            log::debug!("Committed {count} staged operations of all sessions");
        }
        count
    }

    fn discard_staged(&self) -> usize {
        let mut staged = lock(&self.staged);
        let discarded = staged.values().map(Vec::len).sum();
        staged.clear();
        discarded
    }

    fn clear_type(&self, content_type_id: i64) -> usize {
        let mut staged = lock(&self.staged);
        for ops in staged.values_mut() {
            ops.retain(|op| op.content_type_id() != content_type_id);
        }
        let removed = self.write_index().clear_type(content_type_id);
        log::info!("Cleared {removed} documents of content type {content_type_id}");
        removed
    }

    fn staged_count(&self) -> usize {
        lock(&self.staged).values().map(Vec::len).sum()
    }

    /// Supplies omitted treat-as-binary fields from the committed document
    /// or, failing that, the content type's retriever.
    fn fill_binary_fields(
        &self,
        key: &SearchKey,
        fields: &mut BTreeMap<String, StoredValue>,
    ) -> Result<()> {
        let Some(definition) = self.content_types.definition(key.content_type_id()) else {
            return Ok(());
        };
        let missing: Vec<&str> = definition
            .binary_fields_for(key)
            .filter(|name| !fields.contains_key(*name))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let mut to_fetch = Vec::new();
        {
            let index = self.read_index();
            let existing = index.get(key);
            for name in missing {
                match existing.and_then(|doc| doc.fields.get(name)) {
                    Some(value) => {
                        fields.insert(name.to_string(), value.clone());
                    }
                    None => to_fetch.push(name),
                }
            }
        }

        if to_fetch.is_empty() {
            return Ok(());
        }
        let Some(retriever) = self.content_types.retriever(key.content_type_id())? else {
            return Ok(());
        };
        for name in to_fetch {
            if let Some(value) = retriever.retrieve(key, name)? {
                let stored = value.into_stored().map_err(|e| {
                    Error::index_with_source(format!("Failed to read field '{name}' of {key}"), e)
                })?;
                fields.insert(name.to_string(), stored);
            }
        }
        Ok(())
    }
}

/// The in-memory search engine backend.
pub struct MemoryEngine {
    shared: Arc<MemoryShared>,
}

impl MemoryEngine {
    /// Creates a stopped engine.
    ///
    /// # Errors
    ///
    /// `Config` for malformed settings, `Io` when the data directory cannot
    /// be created.
    pub fn new(context: &BackendContext) -> Result<Self> {
        let settings = MemorySettings::from_config(&context.config)?;
        let snapshots = settings
            .data_dir
            .as_deref()
            .map(SnapshotDir::open)
            .transpose()?;
        Ok(Self {
            shared: Arc::new(MemoryShared {
                settings,
                content_types: Arc::clone(&context.content_types),
                snapshots,
                definitions: Mutex::new(BTreeMap::new()),
                staged: Mutex::new(BTreeMap::new()),
                index: RwLock::new(MemoryIndex::default()),
                started: AtomicBool::new(false),
                state_code: AtomicI32::new(EngineState::Initialized.code()),
                next_session: AtomicU64::new(1),
                commits: AtomicU64::new(0),
                optimizations: AtomicU64::new(0),
            }),
        })
    }

    /// Backend settings.
    pub fn settings(&self) -> &MemorySettings {
        &self.shared.settings
    }

    /// Number of committed documents.
    pub fn document_count(&self) -> usize {
        self.shared.read_index().len()
    }

    fn ensure_started(&self) -> Result<()> {
        if self.shared.is_started() {
            Ok(())
        } else {
            Err(Error::unavailable("The memory search engine is not running"))
        }
    }

    fn load_snapshots(&self, snapshots: &SnapshotDir) -> Result<()> {
        if let Some(saved) = snapshots.load_definitions()? {
            log::info!(
                "Loading {} content type definitions saved at {}",
                saved.definitions.len(),
                saved.saved_at
            );
            let mut definitions = lock(&self.shared.definitions);
            for definition in saved.definitions {
                if !self.shared.content_types.contains(definition.content_type_id) {
                    self.shared.content_types.register(definition.clone(), None);
                }
                definitions.insert(definition.content_type_id, definition);
            }
        }
        if let Some(saved) = snapshots.load_documents()? {
            log::info!(
                "Loading {} documents saved at {}",
                saved.documents.len(),
                saved.saved_at
            );
            *self.shared.write_index() = MemoryIndex::from_documents(saved.documents);
        }
        Ok(())
    }
}

impl EngineBackend for MemoryEngine {
    fn name(&self) -> &str {
        "memory"
    }

    fn search_admin(&self) -> Result<Box<dyn AdminBackend>> {
        Ok(Box::new(MemoryAdmin::new(Arc::clone(&self.shared))))
    }

    fn search_indexer(&self) -> Result<Arc<dyn SearchIndexer>> {
        self.ensure_started()?;
        let session = self.shared.next_session.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MemoryIndexer {
            session,
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        }))
    }

    fn release_search_indexer(&self, indexer: Arc<dyn SearchIndexer>) -> Result<()> {
        indexer.close(false)
    }

    fn search_query(&self) -> Result<Arc<dyn SearchQuery>> {
        self.ensure_started()?;
        Ok(Arc::new(MemoryQuery {
            shared: Arc::clone(&self.shared),
        }))
    }

    fn release_search_query(&self, _query: Arc<dyn SearchQuery>) -> Result<()> {
        Ok(())
    }

    fn shutdown(&self, force: bool) -> Result<()> {
        if !self.shared.started.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if force {
            let discarded = self.shared.discard_staged();
            if discarded > 0 {
                log::warn!("Discarded {discarded} uncommitted operations");
            }
        } else {
            self.shared.commit_all();
        }
        if let Some(snapshots) = &self.shared.snapshots {
            let documents = self.shared.read_index().documents().cloned().collect();
            snapshots.save_documents(documents)?;
        }
        Ok(())
    }

    fn start(&self) -> Result<()> {
        if self.shared.is_started() {
            return Ok(());
        }
        if let Some(snapshots) = &self.shared.snapshots {
            self.load_snapshots(snapshots)?;
        }
        self.shared.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.shared.is_started()
    }

    fn state_code(&self) -> i32 {
        self.shared.state_code.load(Ordering::SeqCst)
    }

    fn set_state_code(&self, code: i32) {
        self.shared.state_code.store(code, Ordering::SeqCst);
    }

    fn status_messages(&self) -> Vec<StatusMessage> {
        vec![
            StatusMessage::typed(
                "index",
                format!("{} documents indexed", self.document_count()),
            ),
            StatusMessage::typed(
                "index",
                format!("{} operations staged", self.shared.staged_count()),
            ),
            StatusMessage::typed(
                "index",
                format!(
                    "{} commits, {} optimizations",
                    self.shared.commits.load(Ordering::Relaxed),
                    self.shared.optimizations.load(Ordering::Relaxed)
                ),
            ),
        ]
    }
}

impl fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("settings", &self.shared.settings)
            .field("started", &self.shared.is_started())
            .finish()
    }
}

struct MemoryIndexer {
    session: u64,
    shared: Arc<MemoryShared>,
    closed: AtomicBool,
}

impl MemoryIndexer {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed {
                handle: "SearchIndexer",
            });
        }
        if !self.shared.is_started() {
            return Err(Error::index("The memory search engine is not running"));
        }
        Ok(())
    }

    fn stage(&self, op: StagedOp) {
        let staged = self.shared.stage(self.session, op);
        if staged >= self.shared.settings.autocommit_threshold {
            log::debug!("Session {} reached {staged} staged operations, committing", self.session);
            self.shared.commit_session(self.session);
        }
    }
}

impl SearchIndexer for MemoryIndexer {
    fn update(&self, key: &SearchKey, fragment: ItemFragment, commit_now: bool) -> Result<()> {
        self.ensure_open()?;
        let mut fields = BTreeMap::new();
        for (name, value) in fragment.into_fields() {
            let stored = value.into_stored().map_err(|e| {
                Error::index_with_source(format!("Failed to read field '{name}' of {key}"), e)
            })?;
            fields.insert(name, stored);
        }
        self.shared.fill_binary_fields(key, &mut fields)?;

        self.stage(StagedOp::Upsert {
            key: key.clone(),
            fields,
        });
        if commit_now {
            self.shared.commit_session(self.session);
        }
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.ensure_open()?;
        self.shared.commit_session(self.session);
        Ok(())
    }

    fn commit_all(&self) -> Result<()> {
        self.ensure_open()?;
        self.shared.commit_all();
        Ok(())
    }

    fn delete(&self, keys: &[SearchKey]) -> Result<()> {
        self.ensure_open()?;
        for key in keys {
            self.stage(StagedOp::Delete { key: key.clone() });
        }
        Ok(())
    }

    fn clear_index(&self, content_type_id: i64) -> Result<()> {
        self.ensure_open()?;
        self.shared.clear_type(content_type_id);
        Ok(())
    }

    fn close(&self, optimize: bool) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.commit_session(self.session);
        if optimize {
            self.shared.optimizations.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

struct MemoryQuery {
    shared: Arc<MemoryShared>,
}

impl SearchQuery for MemoryQuery {
    fn execute(&self, request: &QueryRequest) -> Result<QueryResults> {
        if !self.shared.is_started() {
            return Err(Error::query("The memory search engine is not running"));
        }
        Ok(self.shared.read_index().search(request))
    }
}

// ============================================================================
// Tests
// ============================================================================
