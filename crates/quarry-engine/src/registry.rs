//! Backend factories and the process-wide engine registry.
//!
//! [`BackendRegistry`] resolves the configured backend name to a factory.
//! [`EngineRegistry`] owns the current [`SearchEngine`]: `initialize` installs
//! a new one and wakes everyone blocked in `instance`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use backon::{BlockingRetryable, ConstantBuilder};
use quarry_core::wait::{lock, wait_until};
use quarry_core::{EngineConfig, EngineState, Error, Result};

use crate::backend::{BackendContext, EngineBackend};
use crate::engine::SearchEngine;
use crate::memory::MemoryEngine;

/// Creates a backend from its context.
pub type BackendFactory =
    Arc<dyn Fn(&BackendContext) -> Result<Box<dyn EngineBackend>> + Send + Sync>;

/// Name of the built-in in-memory backend.
pub const MEMORY_BACKEND: &str = "memory";

/// Attempts made to stop a stale engine before giving up.
pub const STALE_SHUTDOWN_ATTEMPTS: u32 = 5;

const STALE_SHUTDOWN_DELAY: Duration = Duration::from_millis(200);

/// Default bound for [`EngineRegistry::instance`].
pub const INSTANCE_WAIT: Duration = Duration::from_secs(60);

// ============================================================================
// BackendRegistry
// ============================================================================

/// Case-insensitive map from backend name to factory.
#[derive(Clone)]
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendRegistry {
    /// Registry with the built-in backends.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(MEMORY_BACKEND, |context: &BackendContext| {
            Ok(Box::new(MemoryEngine::new(context)?) as Box<dyn EngineBackend>)
        });
        registry
    }

    /// Registry with no backends.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers (or replaces) a factory.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&BackendContext) -> Result<Box<dyn EngineBackend>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_lowercase(), Arc::new(factory));
    }

    /// Returns `true` if a backend of that name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_lowercase())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Creates the backend named by the context's configuration.
    ///
    /// # Errors
    ///
    /// `Config` when the name is missing or unknown; `BackendInit` wrapping
    /// any factory failure.
    pub fn create(&self, context: &BackendContext) -> Result<Box<dyn EngineBackend>> {
        let name = context.config.backend_name()?;
        let factory = self
            .factories
            .get(&name.to_lowercase())
            .ok_or_else(|| Error::config(format!("Unknown search engine backend '{name}'")))?;
        factory(context).map_err(|e| match e {
            Error::BackendInit { .. } => e,
            other => Error::backend_init(
                format!("Failed to create search engine backend '{name}'"),
                other,
            ),
        })
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("names", &self.names())
            .finish()
    }
}

// ============================================================================
// EngineRegistry
// ============================================================================

/// Owner of the current engine instance.
///
/// Tests construct their own registries; servers use the process-global one
/// through [`initialize`] and [`instance`].
pub struct EngineRegistry {
    backends: RwLock<BackendRegistry>,
    current: Mutex<Option<Arc<SearchEngine>>>,
    ready: Condvar,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new(BackendRegistry::new())
    }
}

impl EngineRegistry {
    /// Creates a registry resolving backends through `backends`.
    pub fn new(backends: BackendRegistry) -> Self {
        Self {
            backends: RwLock::new(backends),
            current: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Registers an additional backend factory.
    pub fn register_backend<F>(&self, name: &str, factory: F)
    where
        F: Fn(&BackendContext) -> Result<Box<dyn EngineBackend>> + Send + Sync + 'static,
    {
        self.backends
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(name, factory);
    }

    /// Creates and installs a new engine.
    ///
    /// The index queue of a previous instance is carried over. A previous
    /// instance that has not shut down, or a backend reporting an instance
    /// left running by an earlier process, is force-stopped first.
    ///
    /// # Errors
    ///
    /// `Config` or `BackendInit` from backend resolution; `ShutdownFailed`
    /// when a stale instance survives every attempt to stop it.
    pub fn initialize(&self, config: &EngineConfig) -> Result<Arc<SearchEngine>> {
        let previous = lock(&self.current).clone();
        let engine = {
            let backends = self.backends.read().unwrap_or_else(PoisonError::into_inner);
            match &previous {
                Some(previous) => SearchEngine::from_config_with_queue(
                    config,
                    &backends,
                    Arc::clone(previous.queue()),
                )?,
                None => SearchEngine::from_config(config, &backends)?,
            }
        };

        if let Some(previous) = previous.filter(|p| p.state() != EngineState::Terminated) {
            retry_stale_shutdown(|| {
                previous.shutdown(true, false, Some("search engine reinitialized"))?;
                if previous.state() == EngineState::Terminated {
                    Ok(())
                } else {
                    Err(Error::illegal_state(format!(
                        "Previous search engine is still {}",
                        previous.state()
                    )))
                }
            })?;
        }
        if engine.backend_reports_started() {
            retry_stale_shutdown(|| engine.stop_stale_backend())?;
        }

        *lock(&self.current) = Some(Arc::clone(&engine));
        self.ready.notify_all();
        log::info!("Search engine '{}' initialized", engine.backend_name());
        Ok(engine)
    }

    /// Current engine, waiting up to 60 seconds for the first `initialize`.
    pub fn instance(&self) -> Result<Arc<SearchEngine>> {
        self.instance_timeout(INSTANCE_WAIT)
    }

    /// Current engine, waiting up to `timeout` for the first `initialize`.
    ///
    /// # Errors
    ///
    /// `NotInitialized` when the wait ends with no engine installed.
    pub fn instance_timeout(&self, timeout: Duration) -> Result<Arc<SearchEngine>> {
        let guard = lock(&self.current);
        let (current, _) = wait_until(&self.ready, guard, timeout, |current| current.is_some());
        current
            .clone()
            .ok_or(Error::NotInitialized { waited: timeout })
    }

    /// Current engine without waiting.
    pub fn try_instance(&self) -> Option<Arc<SearchEngine>> {
        lock(&self.current).clone()
    }
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("initialized", &self.try_instance().is_some())
            .finish()
    }
}

fn retry_stale_shutdown<F>(op: F) -> Result<()>
where
    F: FnMut() -> Result<()>,
{
    op.retry(
        ConstantBuilder::default()
            .with_delay(STALE_SHUTDOWN_DELAY)
            .with_max_times(STALE_SHUTDOWN_ATTEMPTS as usize - 1),
    )
    .sleep(std::thread::sleep)
    .notify(|e: &Error, delay: Duration| {
        log::warn!("Failed to stop stale search engine: {e}, retrying in {delay:?}");
    })
    .call()
    .map_err(|e| {
        log::error!("Giving up on stale search engine after {STALE_SHUTDOWN_ATTEMPTS} attempts: {e}");
        Error::ShutdownFailed {
            attempts: STALE_SHUTDOWN_ATTEMPTS,
        }
    })
}

// ============================================================================
// Process-global registry
// ============================================================================

static GLOBAL: OnceLock<EngineRegistry> = OnceLock::new();

/// The process-global registry.
pub fn global() -> &'static EngineRegistry {
    GLOBAL.get_or_init(EngineRegistry::default)
}

/// Initializes the process-global engine.
pub fn initialize(config: &EngineConfig) -> Result<Arc<SearchEngine>> {
    global().initialize(config)
}

/// The process-global engine, waiting up to 60 seconds for initialization.
pub fn instance() -> Result<Arc<SearchEngine>> {
    global().instance()
}

// ============================================================================
// Tests
// ============================================================================
