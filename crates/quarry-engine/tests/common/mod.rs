//! Common test utilities and harness for quarry-engine integration tests.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use quarry_core::{EngineConfig, EngineState, Error, ItemFragment, Result, SearchKey};
use quarry_engine::{
    AdminBackend, BackendContext, BackendRegistry, EngineBackend, EngineRegistry, ItemDefinition,
    QueryRequest, QueryResults, SearchEngine, SearchIndexer, SearchQuery,
};

/// Backend name the mock registers under.
pub const MOCK_BACKEND: &str = "MockEngine";

/// Observations and knobs shared by every mock backend a harness creates.
#[derive(Default)]
pub struct Probe {
    /// Number of backend starts.
    pub starts: AtomicUsize,
    /// `force` flag of every backend shutdown, in order.
    pub shutdowns: Mutex<Vec<bool>>,
    /// Remaining shutdowns that fail before one succeeds.
    pub failing_shutdowns: AtomicUsize,
    /// Backend liveness.
    pub live: AtomicBool,
    /// State code the engine last stored in the backend.
    pub state_code: AtomicI32,
    /// Indexer sessions released through the backend.
    pub released_indexers: AtomicUsize,
    /// Query sessions released through the backend.
    pub released_queries: AtomicUsize,
    /// Keys passed to `update`, with the field names that survived filtering.
    pub updates: Mutex<Vec<(SearchKey, Vec<String>)>>,
    /// Whether the next admin session asks for a restart on save.
    pub restart_on_save: AtomicBool,
}

impl Probe {
    /// Force flags of all backend shutdowns so far.
    pub fn shutdown_flags(&self) -> Vec<bool> {
        self.shutdowns.lock().unwrap().clone()
    }

    /// Makes the backend look like an instance an earlier process left running.
    pub fn leave_running(&self) {
        self.live.store(true, Ordering::SeqCst);
        self.state_code
            .store(EngineState::Running.code(), Ordering::SeqCst);
    }
}

/// Mock backend recording every lifecycle call in its [`Probe`].
pub struct MockEngine {
    probe: Arc<Probe>,
}

impl EngineBackend for MockEngine {
    fn name(&self) -> &str {
        MOCK_BACKEND
    }

    fn search_admin(&self) -> Result<Box<dyn AdminBackend>> {
        Ok(Box::new(MockAdmin {
            probe: Arc::clone(&self.probe),
            restart: false,
        }))
    }

    fn search_indexer(&self) -> Result<Arc<dyn SearchIndexer>> {
        Ok(Arc::new(MockIndexer {
            probe: Arc::clone(&self.probe),
        }))
    }

    fn release_search_indexer(&self, _indexer: Arc<dyn SearchIndexer>) -> Result<()> {
        self.probe.released_indexers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn search_query(&self) -> Result<Arc<dyn SearchQuery>> {
        Ok(Arc::new(MockQuery))
    }

    fn release_search_query(&self, _query: Arc<dyn SearchQuery>) -> Result<()> {
        self.probe.released_queries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn shutdown(&self, force: bool) -> Result<()> {
        self.probe.shutdowns.lock().unwrap().push(force);
        let failing = self.probe.failing_shutdowns.load(Ordering::SeqCst);
        if failing > 0 {
            self.probe
                .failing_shutdowns
                .store(failing - 1, Ordering::SeqCst);
            return Err(Error::index("mock backend refused to stop"));
        }
        self.probe.live.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn start(&self) -> Result<()> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        self.probe.live.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.probe.live.load(Ordering::SeqCst)
    }

    fn state_code(&self) -> i32 {
        self.probe.state_code.load(Ordering::SeqCst)
    }

    fn set_state_code(&self, code: i32) {
        self.probe.state_code.store(code, Ordering::SeqCst);
    }
}

struct MockIndexer {
    probe: Arc<Probe>,
}

impl SearchIndexer for MockIndexer {
    fn update(&self, key: &SearchKey, fragment: ItemFragment, _commit_now: bool) -> Result<()> {
        let names = fragment.names().map(str::to_string).collect();
        self.probe.updates.lock().unwrap().push((key.clone(), names));
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        Ok(())
    }

    fn commit_all(&self) -> Result<()> {
        Ok(())
    }

    fn delete(&self, _keys: &[SearchKey]) -> Result<()> {
        Ok(())
    }

    fn clear_index(&self, _content_type_id: i64) -> Result<()> {
        Ok(())
    }

    fn close(&self, _optimize: bool) -> Result<()> {
        Ok(())
    }
}

struct MockQuery;

impl SearchQuery for MockQuery {
    fn execute(&self, _request: &QueryRequest) -> Result<QueryResults> {
        Ok(QueryResults::default())
    }
}

struct MockAdmin {
    probe: Arc<Probe>,
    restart: bool,
}

impl AdminBackend for MockAdmin {
    fn update(&mut self, _definition: &ItemDefinition, _notify: bool) -> Result<bool> {
        Ok(false)
    }

    fn save(&mut self) -> Result<()> {
        self.restart = self.probe.restart_on_save.load(Ordering::SeqCst);
        Ok(())
    }

    fn verify(&mut self, _known_content_types: &[i64]) -> Result<()> {
        Ok(())
    }

    fn rebuild_indexes(&mut self, content_types: &[i64]) -> Result<Vec<i64>> {
        Ok(content_types.iter().copied().filter(|id| *id > 0).collect())
    }

    fn optimize_indexes(&mut self, content_types: &[i64]) -> Result<Vec<i64>> {
        Ok(content_types.to_vec())
    }

    fn delete(&mut self, _content_type_id: Option<i64>) -> Result<()> {
        Ok(())
    }

    fn take_restart_request(&mut self) -> bool {
        std::mem::take(&mut self.restart)
    }
}

/// Test harness: an isolated engine registry with the mock backend.
pub struct TestHarness {
    /// Shared mock observations.
    pub probe: Arc<Probe>,
    /// Registry resolving `MockEngine` to the mock.
    pub registry: EngineRegistry,
}

impl TestHarness {
    /// Creates a harness with a fresh probe.
    pub fn new() -> Self {
        let probe = Arc::new(Probe::default());
        let mut backends = BackendRegistry::new();
        let factory_probe = Arc::clone(&probe);
        backends.register(MOCK_BACKEND, move |_: &BackendContext| {
            Ok(Box::new(MockEngine {
                probe: Arc::clone(&factory_probe),
            }) as Box<dyn EngineBackend>)
        });
        Self {
            probe,
            registry: EngineRegistry::new(backends),
        }
    }

    /// Initializes an engine without starting it.
    pub fn engine(&self) -> Arc<SearchEngine> {
        self.registry.initialize(&mock_config()).unwrap()
    }

    /// Initializes and starts an engine.
    pub fn running_engine(&self) -> Arc<SearchEngine> {
        let engine = self.engine();
        engine.start().unwrap();
        engine
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Mock backend configuration with short waits.
pub fn mock_config() -> EngineConfig {
    EngineConfig::for_backend(MOCK_BACKEND)
        .with("pausewaitms", "100")
        .with("drainwaitms", "400")
        .with("adminwaitms", "300")
}

/// Polls `done` every few milliseconds until it holds or `timeout` passes.
pub fn eventually(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}
