//! The search engine lifecycle controller.
//!
//! [`SearchEngine`] is the single source of truth for engine availability. It
//! issues and tracks indexer, query, and admin handles, pauses and drains
//! them, and runs start, restart, and shutdown sequences against a pluggable
//! [`EngineBackend`].
//!
//! # Locking
//!
//! State lives behind three independent locks, each with its own condition
//! variable:
//!
//! - the monitor: state, pause counter, pre-pause state, pause and shutdown
//!   messages, admin-lock owner
//! - the live indexer set
//! - the live query set
//!
//! A fourth mutex serialises start, restart, and shutdown sequences. The
//! monitor may be held while inserting into a set, but no thread blocks on
//! one of these locks while holding another; every wait releases the lock it
//! waits on.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

use quarry_core::wait::{lock, wait_until};
use quarry_core::{
    EngineConfig, EngineState, Error, Result, StatusMessage, StatusSnapshot, WaitOutcome,
};
use quarry_queue::IndexQueue;

use crate::admin::SearchAdmin;
use crate::backend::{BackendContext, EngineBackend};
use crate::content_type::ContentTypeRegistry;
use crate::handles::{HandleId, HandleSet};
use crate::indexer::{IndexerCore, IndexerHandle};
use crate::query::{QueryCore, QueryHandle};
use crate::registry::BackendRegistry;
use crate::settings::ControllerSettings;

struct AdminOwner {
    id: HandleId,
    name: String,
}

struct Monitor {
    state: EngineState,
    pause_count: u32,
    pre_pause: EngineState,
    pause_message: Option<String>,
    shutdown_message: Option<String>,
    admin_owner: Option<AdminOwner>,
    // The first pause is draining live handles.
    draining: bool,
    // A shutdown sequence has begun and not yet reached Terminated.
    stopping: bool,
}

/// Search engine lifecycle and concurrency controller.
///
/// Always held in an [`Arc`]; admin sessions keep a weak reference back to
/// the engine so configuration changes can restart it.
pub struct SearchEngine {
    backend: Box<dyn EngineBackend>,
    settings: ControllerSettings,
    queue: Arc<IndexQueue>,
    content_types: Arc<ContentTypeRegistry>,
    monitor: Mutex<Monitor>,
    monitor_signal: Condvar,
    lifecycle: Mutex<()>,
    indexers: HandleSet<IndexerCore>,
    queries: HandleSet<QueryCore>,
    this: Weak<SearchEngine>,
}

impl SearchEngine {
    /// Creates an engine in the `Initialized` state.
    pub fn new(
        backend: Box<dyn EngineBackend>,
        settings: ControllerSettings,
        queue: Arc<IndexQueue>,
        content_types: Arc<ContentTypeRegistry>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            backend,
            settings,
            queue,
            content_types,
            monitor: Mutex::new(Monitor {
                state: EngineState::Initialized,
                pause_count: 0,
                pre_pause: EngineState::Initialized,
                pause_message: None,
                shutdown_message: None,
                admin_owner: None,
                draining: false,
                stopping: false,
            }),
            monitor_signal: Condvar::new(),
            lifecycle: Mutex::new(()),
            indexers: HandleSet::new("search indexer"),
            queries: HandleSet::new("search query"),
            this: this.clone(),
        })
    }

    /// Builds an engine and its backend from configuration.
    ///
    /// # Errors
    ///
    /// `Config` when no backend is named or the name is unknown,
    /// `BackendInit` when the backend cannot be constructed.
    pub fn from_config(config: &EngineConfig, backends: &BackendRegistry) -> Result<Arc<Self>> {
        let queue = Arc::new(IndexQueue::from_config(config)?);
        Self::from_config_with_queue(config, backends, queue)
    }

    /// Like [`from_config`](Self::from_config) but reuses an existing queue.
    pub fn from_config_with_queue(
        config: &EngineConfig,
        backends: &BackendRegistry,
        queue: Arc<IndexQueue>,
    ) -> Result<Arc<Self>> {
        let settings = ControllerSettings::from_config(config)?;
        let context = BackendContext::new(config.clone());
        let content_types = Arc::clone(&context.content_types);
        let backend = backends.create(&context)?;
        log::info!("Created search engine backend '{}'", backend.name());
        Ok(Self::new(backend, settings, queue, content_types))
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Current state.
    pub fn state(&self) -> EngineState {
        lock(&self.monitor).state
    }

    /// Returns `true` while at least one pause is outstanding.
    pub fn is_paused(&self) -> bool {
        lock(&self.monitor).pause_count > 0
    }

    /// Backend name.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Wait budgets and messages.
    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// The index event queue.
    pub fn queue(&self) -> &Arc<IndexQueue> {
        &self.queue
    }

    /// Content-type definitions shared with the backend and admins.
    pub fn content_types(&self) -> &Arc<ContentTypeRegistry> {
        &self.content_types
    }

    /// Number of indexer handles issued and not yet released.
    pub fn live_indexer_count(&self) -> usize {
        self.indexers.len()
    }

    /// Number of query handles issued and not yet released.
    pub fn live_query_count(&self) -> usize {
        self.queries.len()
    }

    fn transition(&self, monitor: &mut Monitor, to: EngineState) {
        if monitor.state != to {
            log::info!(
                "Search engine '{}': {} -> {}",
                self.backend.name(),
                monitor.state,
                to
            );
            monitor.state = to;
            self.backend.set_state_code(to.code());
            self.monitor_signal.notify_all();
        }
    }

    fn unavailable_error(&self, monitor: &Monitor) -> Error {
        let message = monitor
            .pause_message
            .clone()
            .unwrap_or_else(|| self.settings.unavailable_message.clone());
        match &monitor.shutdown_message {
            Some(reason) if monitor.state != EngineState::Running => {
                Error::unavailable(format!("{message} ({reason})"))
            }
            _ => Error::unavailable(message),
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Starts the engine unless it is already started and available.
    pub fn start(&self) -> Result<()> {
        if self.state().is_started() && self.backend.is_available() {
            return Ok(());
        }
        self.restart()
    }

    /// Shuts down (if started) and starts the engine again.
    ///
    /// # Errors
    ///
    /// `IllegalState` while a shutdown is in progress; otherwise whatever the
    /// backend reports.
    pub fn restart(&self) -> Result<()> {
        self.restart_with(true)
    }

    /// Restart issued by an admin session, which must not wait for itself.
    pub(crate) fn restart_from_admin(&self) -> Result<()> {
        self.restart_with(false)
    }

    fn restart_with(&self, check_admin: bool) -> Result<()> {
        // Checked before the lifecycle lock, which a shutdown holds until done.
        self.ensure_not_stopping()?;
        let _cycle = lock(&self.lifecycle);
        self.ensure_not_stopping()?;
        let state = self.state();
        if state.is_started() {
            self.shutdown_sequence(false, check_admin, None)?;
        }

        log::info!("Starting search engine '{}'", self.backend.name());
        self.backend.start()?;

        let mut monitor = lock(&self.monitor);
        monitor.shutdown_message = None;
        if monitor.pause_count > 0 {
            monitor.pre_pause = EngineState::Running;
            self.transition(&mut monitor, EngineState::Paused);
        } else {
            self.transition(&mut monitor, EngineState::Running);
        }
        Ok(())
    }

    fn ensure_not_stopping(&self) -> Result<()> {
        let monitor = lock(&self.monitor);
        if monitor.stopping || monitor.state == EngineState::Terminating {
            return Err(Error::illegal_state(
                "Cannot restart the search engine while it is shutting down",
            ));
        }
        Ok(())
    }

    /// Shuts the engine down.
    ///
    /// A no-op when already shutting down or shut down. Live handles get the
    /// configured drain budget (none when `force`); when `check_admin` is set
    /// a locked admin gets the configured admin wait. Either timing out
    /// escalates to a forced backend shutdown. The admin lock is cleared and
    /// the engine ends `Terminated` even when the backend fails; that failure
    /// is returned afterwards.
    pub fn shutdown(&self, force: bool, check_admin: bool, reason: Option<&str>) -> Result<()> {
        let _cycle = lock(&self.lifecycle);
        self.shutdown_sequence(force, check_admin, reason)
    }

    fn shutdown_sequence(&self, force: bool, check_admin: bool, reason: Option<&str>) -> Result<()> {
        {
            let mut monitor = lock(&self.monitor);
            if monitor.state.is_stopping() {
                log::debug!("Search engine already {}", monitor.state);
                return Ok(());
            }
            monitor.stopping = true;
            if let Some(reason) = reason {
                monitor.shutdown_message = Some(reason.to_string());
            }
        }
        log::info!(
            "Shutting down search engine '{}' (force: {force}, reason: {})",
            self.backend.name(),
            reason.unwrap_or("none")
        );

        let mut force = force;
        let budget = if force {
            Duration::ZERO
        } else {
            self.settings.drain_wait
        };
        // A nested pause does not drain by itself, so drain here as well.
        let started = Instant::now();
        let paused = self.pause(budget, None);
        let drained = self.drain(budget.saturating_sub(started.elapsed()));
        if !(paused.is_completed() && drained.is_completed()) && !force {
            log::warn!("Live handles not released within {budget:?}, forcing shutdown");
            force = true;
        }

        {
            let mut monitor = lock(&self.monitor);
            self.transition(&mut monitor, EngineState::Terminating);
            if check_admin && monitor.admin_owner.is_some() {
                let (monitor, outcome) = wait_until(
                    &self.monitor_signal,
                    monitor,
                    self.settings.admin_wait,
                    |monitor| monitor.admin_owner.is_none(),
                );
                if outcome.timed_out() {
                    let owner = monitor
                        .admin_owner
                        .as_ref()
                        .map(|owner| owner.name.as_str())
                        .unwrap_or("unknown");
                    log::warn!(
                        "Search admin {owner} still locked after {:?}, forcing shutdown",
                        self.settings.admin_wait
                    );
                    force = true;
                }
            }
        }

        let result = self.backend.shutdown(force);

        // Handles obtained through the internal variants after the drain.
        self.force_release_indexers();
        self.force_release_queries();
        {
            let mut monitor = lock(&self.monitor);
            monitor.admin_owner = None;
            monitor.stopping = false;
            self.transition(&mut monitor, EngineState::Terminated);
        }
        self.unpause();
        self.monitor_signal.notify_all();
        self.queue.poll_now();

        match &result {
            Ok(()) => log::info!("Search engine '{}' shut down", self.backend.name()),
            Err(e) => log::error!(
                "Search engine '{}' failed to shut down cleanly: {e}",
                self.backend.name()
            ),
        }
        result
    }

    /// Returns `true` if a freshly created backend reports a started state,
    /// i.e. an instance an earlier process left running.
    pub fn backend_reports_started(&self) -> bool {
        EngineState::from_code(self.backend.state_code()).is_some_and(EngineState::is_started)
    }

    /// Force-stops a backend left running by an earlier process.
    pub(crate) fn stop_stale_backend(&self) -> Result<()> {
        log::warn!(
            "Search engine '{}' reports a running instance, forcing shutdown",
            self.backend.name()
        );
        self.backend.shutdown(true)?;
        self.backend.set_state_code(EngineState::Initialized.code());
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Pause
    // ------------------------------------------------------------------------

    /// Pauses the engine. Pauses nest; each needs a matching [`unpause`].
    ///
    /// The first pause drains live handles: indexers get half of `wait`,
    /// queries the remainder. Handles still live afterwards are released by
    /// force and the outcome is `TimedOut`. A nested pause waits up to `wait`
    /// for the first pause's drain to finish and does not drain by itself.
    ///
    /// [`unpause`]: Self::unpause
    pub fn pause(&self, wait: Duration, message: Option<&str>) -> WaitOutcome {
        let mut monitor = lock(&self.monitor);
        monitor.pause_count += 1;
        if let Some(message) = message {
            monitor.pause_message = Some(message.to_string());
        }
        if monitor.pause_count > 1 {
            let (_monitor, outcome) =
                wait_until(&self.monitor_signal, monitor, wait, |monitor| !monitor.draining);
            return outcome;
        }

        monitor.pre_pause = monitor.state;
        if !monitor.state.is_stopping() {
            self.transition(&mut monitor, EngineState::Paused);
        }
        monitor.draining = true;
        drop(monitor);

        let outcome = self.drain(wait);
        lock(&self.monitor).draining = false;
        self.monitor_signal.notify_all();
        outcome
    }

    /// Undoes one [`pause`](Self::pause). The last one restores the
    /// pre-pause state and clears the pause message.
    pub fn unpause(&self) {
        let mut monitor = lock(&self.monitor);
        if monitor.pause_count == 0 {
            log::warn!("Unpause without a matching pause");
            return;
        }
        monitor.pause_count -= 1;
        if monitor.pause_count == 0 {
            if monitor.state == EngineState::Paused {
                let restored = monitor.pre_pause;
                self.transition(&mut monitor, restored);
            }
            monitor.pause_message = None;
            drop(monitor);
            self.monitor_signal.notify_all();
        }
    }

    fn drain(&self, wait: Duration) -> WaitOutcome {
        let started = Instant::now();
        let mut outcome = WaitOutcome::Completed;

        if !self.indexers.wait_empty(wait / 2).is_completed() {
            self.force_release_indexers();
            outcome = WaitOutcome::TimedOut;
        }
        let remaining = wait.saturating_sub(started.elapsed());
        if !self.queries.wait_empty(remaining).is_completed() {
            self.force_release_queries();
            outcome = WaitOutcome::TimedOut;
        }
        outcome
    }

    fn force_release_indexers(&self) {
        for (id, core) in self.indexers.take_all() {
            log::warn!("Forcing release of {} {id}", self.indexers.kind());
            core.mark_closed();
            if let Err(e) = self.backend.release_search_indexer(Arc::clone(&core.indexer)) {
                log::warn!("Failed to release {} {id}: {e}", self.indexers.kind());
            }
        }
    }

    fn force_release_queries(&self) {
        for (id, core) in self.queries.take_all() {
            log::warn!("Forcing release of {} {id}", self.queries.kind());
            core.mark_closed();
            if let Err(e) = self.backend.release_search_query(Arc::clone(&core.query)) {
                log::warn!("Failed to release {} {id}: {e}", self.queries.kind());
            }
        }
    }

    // ------------------------------------------------------------------------
    // Indexer and query handles
    // ------------------------------------------------------------------------

    /// Obtains an indexer, waiting while the engine is paused.
    ///
    /// # Errors
    ///
    /// `EngineUnavailable` when the engine is not running once the pause
    /// wait ends.
    pub fn search_indexer(&self) -> Result<IndexerHandle> {
        self.acquire_indexer(true)
    }

    /// Obtains an indexer without waiting on a pause.
    pub fn search_indexer_internal(&self) -> Result<IndexerHandle> {
        self.acquire_indexer(false)
    }

    /// Obtains a query handle, waiting while the engine is paused.
    pub fn search_query(&self) -> Result<QueryHandle> {
        self.acquire_query(true)
    }

    /// Obtains a query handle without waiting on a pause.
    pub fn search_query_internal(&self) -> Result<QueryHandle> {
        self.acquire_query(false)
    }

    fn acquire_indexer(&self, wait_for_pause: bool) -> Result<IndexerHandle> {
        self.check_accepting(wait_for_pause)?;
        let core = Arc::new(IndexerCore::new(self.backend.search_indexer()?));
        if let Err(e) = self.track(wait_for_pause, &self.indexers, core.id, Arc::clone(&core)) {
            core.mark_closed();
            if let Err(release) = self.backend.release_search_indexer(Arc::clone(&core.indexer)) {
                log::warn!("Failed to release untracked search indexer: {release}");
            }
            return Err(e);
        }
        log::debug!("Issued search indexer {}", core.id);
        Ok(IndexerHandle::new(core, Arc::clone(&self.content_types)))
    }

    fn acquire_query(&self, wait_for_pause: bool) -> Result<QueryHandle> {
        self.check_accepting(wait_for_pause)?;
        let core = Arc::new(QueryCore::new(self.backend.search_query()?));
        if let Err(e) = self.track(wait_for_pause, &self.queries, core.id, Arc::clone(&core)) {
            core.mark_closed();
            if let Err(release) = self.backend.release_search_query(Arc::clone(&core.query)) {
                log::warn!("Failed to release untracked search query: {release}");
            }
            return Err(e);
        }
        log::debug!("Issued search query {}", core.id);
        Ok(QueryHandle::new(core))
    }

    fn accepts_handles(state: EngineState, wait_for_pause: bool) -> bool {
        state == EngineState::Running || (!wait_for_pause && state == EngineState::Paused)
    }

    fn check_accepting(&self, wait_for_pause: bool) -> Result<()> {
        let guard = lock(&self.monitor);
        let monitor = if wait_for_pause {
            let (guard, _) = wait_until(
                &self.monitor_signal,
                guard,
                self.settings.pause_wait,
                |monitor| monitor.state != EngineState::Paused,
            );
            guard
        } else {
            guard
        };
        if Self::accepts_handles(monitor.state, wait_for_pause) {
            Ok(())
        } else {
            Err(self.unavailable_error(&monitor))
        }
    }

    /// Adds a freshly created handle unless the engine left the accepting
    /// state while the backend was creating it.
    fn track<T: ?Sized>(
        &self,
        wait_for_pause: bool,
        set: &HandleSet<T>,
        id: HandleId,
        entry: Arc<T>,
    ) -> Result<()> {
        let monitor = lock(&self.monitor);
        if !Self::accepts_handles(monitor.state, wait_for_pause) {
            return Err(self.unavailable_error(&monitor));
        }
        set.insert(id, entry);
        Ok(())
    }

    /// Returns an indexer obtained from this engine.
    ///
    /// # Errors
    ///
    /// `IllegalState` if the handle was not issued by this engine or was
    /// already released.
    pub fn release_search_indexer(&self, handle: &IndexerHandle) -> Result<()> {
        let Some(core) = self.indexers.remove(handle.id()) else {
            log::error!(
                "Search indexer {} was not obtained from this engine, or was released twice",
                handle.id()
            );
            return Err(Error::illegal_state(format!(
                "Search indexer {} was not obtained from this engine, or was released twice",
                handle.id()
            )));
        };
        core.mark_closed();
        let result = self.backend.release_search_indexer(Arc::clone(&core.indexer));
        self.indexers.notify();
        log::debug!("Released search indexer {}", core.id);
        result
    }

    /// Returns a query handle obtained from this engine.
    ///
    /// # Errors
    ///
    /// `IllegalState` if the handle was not issued by this engine or was
    /// already released.
    pub fn release_search_query(&self, handle: &QueryHandle) -> Result<()> {
        let Some(core) = self.queries.remove(handle.id()) else {
            log::error!(
                "Search query {} was not obtained from this engine, or was released twice",
                handle.id()
            );
            return Err(Error::illegal_state(format!(
                "Search query {} was not obtained from this engine, or was released twice",
                handle.id()
            )));
        };
        core.mark_closed();
        let result = self.backend.release_search_query(Arc::clone(&core.query));
        self.queries.notify();
        log::debug!("Released search query {}", core.id);
        result
    }

    // ------------------------------------------------------------------------
    // Admin
    // ------------------------------------------------------------------------

    /// Obtains an admin session; `locked` takes the admin lock.
    ///
    /// # Errors
    ///
    /// `IllegalState` unless the engine is initialized, running, or paused;
    /// `AdminLocked` at once when a locked admin is already outstanding.
    pub fn search_admin(&self, locked: bool) -> Result<SearchAdmin> {
        let id = HandleId::next();
        {
            let mut monitor = lock(&self.monitor);
            if !monitor.state.allows_admin() {
                return Err(Error::illegal_state(format!(
                    "Search admin is not available while the search engine is {}",
                    monitor.state
                )));
            }
            if locked {
                if let Some(owner) = &monitor.admin_owner {
                    return Err(Error::AdminLocked {
                        owner: owner.name.clone(),
                    });
                }
                monitor.admin_owner = Some(AdminOwner {
                    id,
                    name: format!("{} admin {id}", self.backend.name()),
                });
            }
        }

        match self.backend.search_admin() {
            Ok(backend) => {
                log::debug!("Issued search admin {id} (locked: {locked})");
                Ok(SearchAdmin::new(
                    id,
                    locked,
                    backend,
                    Arc::clone(&self.content_types),
                    self.this.clone(),
                ))
            }
            Err(e) => {
                if locked {
                    self.clear_admin_owner(id);
                }
                Err(e)
            }
        }
    }

    /// Ends an admin session, releasing the admin lock if it holds it.
    pub fn release_search_admin(&self, mut admin: SearchAdmin) {
        admin.mark_released();
        self.clear_admin_owner(admin.id());
    }

    pub(crate) fn clear_admin_owner(&self, id: HandleId) {
        {
            let mut monitor = lock(&self.monitor);
            if monitor.admin_owner.as_ref().is_some_and(|owner| owner.id == id) {
                monitor.admin_owner = None;
                log::debug!("Search admin {id} released the admin lock");
            }
        }
        self.monitor_signal.notify_all();
    }

    /// Returns `true` while a locked admin is outstanding.
    pub fn is_search_admin_locked(&self) -> bool {
        lock(&self.monitor).admin_owner.is_some()
    }

    // ------------------------------------------------------------------------
    // Availability and status
    // ------------------------------------------------------------------------

    /// Returns `true` if the backend is live and the engine is running.
    ///
    /// With `resync`, a disagreement between backend liveness and the tracked
    /// state is corrected by starting or force-stopping the engine.
    pub fn is_available(&self, resync: bool) -> bool {
        let live = self.backend.is_available();
        if resync {
            let state = self.state();
            if live && !state.is_started() && state != EngineState::Terminating {
                log::info!("Search backend is live while the engine is {state}, starting");
                if let Err(e) = self.start() {
                    log::error!("Failed to start search engine: {e}");
                }
            } else if !live && state.is_started() {
                log::warn!("Search backend is not live while the engine is {state}, shutting down");
                if let Err(e) = self.shutdown(true, false, Some("search backend unavailable")) {
                    log::error!("Failed to shut down search engine: {e}");
                }
            }
        }
        live && self.state().is_running()
    }

    /// Point-in-time status.
    pub fn status(&self) -> StatusSnapshot {
        let (state, pause_message, admin_owner) = {
            let monitor = lock(&self.monitor);
            (
                monitor.state,
                monitor.pause_message.clone(),
                monitor.admin_owner.as_ref().map(|owner| owner.name.clone()),
            )
        };
        let queue_length = self.queue.event_count().unwrap_or_else(|e| {
            log::warn!("Unable to read index queue length: {e}");
            0
        });
        let mut snapshot = StatusSnapshot::new(state, self.queue.status().code(), queue_length);
        if let Some(message) = pause_message {
            snapshot.messages.push(StatusMessage::typed("pause", message));
        }
        if let Some(owner) = admin_owner {
            snapshot
                .messages
                .push(StatusMessage::typed("admin", format!("Locked by {owner}")));
        }
        if state.is_running() {
            snapshot.messages.extend(self.backend.status_messages());
        }
        snapshot
    }
}

impl fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchEngine")
            .field("backend", &self.backend.name())
            .field("state", &self.state())
            .field("indexers", &self.indexers)
            .field("queries", &self.queries)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
