//! The pluggable engine backend contract.
//!
//! [`SearchEngine`](crate::SearchEngine) owns the lifecycle and the handle
//! bookkeeping; a backend only manufactures and cleans up handles and starts
//! or stops the underlying index. Backends are created by name through a
//! [`BackendRegistry`](crate::BackendRegistry).

use std::sync::Arc;

use quarry_core::{EngineConfig, Result, StatusMessage};

use crate::admin::AdminBackend;
use crate::content_type::ContentTypeRegistry;
use crate::indexer::SearchIndexer;
use crate::query::SearchQuery;

/// What a backend factory receives.
#[derive(Debug, Clone)]
pub struct BackendContext {
    /// Full engine configuration; backend keys are lower-cased.
    pub config: EngineConfig,
    /// Content-type definitions shared with the engine and its admins.
    pub content_types: Arc<ContentTypeRegistry>,
}

impl BackendContext {
    /// Creates a context with an empty content-type registry.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            content_types: Arc::new(ContentTypeRegistry::new()),
        }
    }
}

/// Hooks a search engine implementation provides to the controller.
///
/// The controller serialises `start` and `shutdown`, and never calls a hook
/// while holding its monitor except [`set_state_code`](Self::set_state_code),
/// which must not call back into the engine.
pub trait EngineBackend: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &str;

    /// Creates an admin session.
    fn search_admin(&self) -> Result<Box<dyn AdminBackend>>;

    /// Creates an indexer session.
    fn search_indexer(&self) -> Result<Arc<dyn SearchIndexer>>;

    /// Cleans up an indexer session the controller has untracked.
    fn release_search_indexer(&self, indexer: Arc<dyn SearchIndexer>) -> Result<()>;

    /// Creates a query session.
    fn search_query(&self) -> Result<Arc<dyn SearchQuery>>;

    /// Cleans up a query session the controller has untracked.
    fn release_search_query(&self, query: Arc<dyn SearchQuery>) -> Result<()>;

    /// Stops the engine. `force` means live sessions may be abandoned.
    fn shutdown(&self, force: bool) -> Result<()>;

    /// Starts the engine.
    fn start(&self) -> Result<()>;

    /// Liveness probe.
    fn is_available(&self) -> bool;

    /// Engine state code last recorded by the backend.
    ///
    /// A started code on a freshly created backend marks an instance left
    /// running by an earlier process.
    fn state_code(&self) -> i32;

    /// Records the controller's state code.
    fn set_state_code(&self, code: i32);

    /// Implementation-specific status lines, reported while running.
    fn status_messages(&self) -> Vec<StatusMessage> {
        Vec::new()
    }
}
