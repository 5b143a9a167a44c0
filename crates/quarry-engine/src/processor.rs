//! Background application of queued index events.
//!
//! [`QueueProcessor::spawn`] starts a worker thread that waits on the index
//! queue's poll signal and feeds pending events to an internal indexer
//! whenever the engine is running. [`process_once`] applies one batch
//! synchronously.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use quarry_core::{Error, ItemFragment, Result, WaitOutcome};
use quarry_queue::{IndexEvent, QueueItem};

use crate::engine::SearchEngine;
use crate::indexer::IndexerHandle;

/// Outcome of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Items taken from the queue.
    pub loaded: usize,
    /// Items applied to the index.
    pub applied: usize,
    /// Items that failed and were dropped.
    pub failed: usize,
}

/// Applies up to `batch_size` queued events (0 = all) to the engine.
///
/// Nothing is loaded unless the engine is running. Events that fail are
/// logged and dropped with the rest of the batch once the batch commits; if
/// the commit itself fails, the batch stays queued for the next attempt.
///
/// # Errors
///
/// Queue store failures, or the indexer acquisition and commit errors of the
/// engine.
pub fn process_once(engine: &SearchEngine, batch_size: usize) -> Result<BatchReport> {
    if !engine.state().is_running() {
        return Ok(BatchReport::default());
    }
    let queue = engine.queue();
    let items = queue.load_items(batch_size)?;
    if items.is_empty() {
        return Ok(BatchReport::default());
    }

    let indexer = match engine.search_indexer_internal() {
        Ok(indexer) => indexer,
        Err(e) => {
            queue.reset_position();
            return Err(e);
        }
    };
    let mut report = BatchReport {
        loaded: items.len(),
        ..BatchReport::default()
    };
    for item in &items {
        match apply(&indexer, item) {
            Ok(()) => report.applied += 1,
            Err(e) => {
                report.failed += 1;
                log::warn!("Dropping index event {}: {e}", item.queue_id);
            }
        }
    }

    let committed = indexer.commit();
    if let Err(e) = engine.release_search_indexer(&indexer) {
        log::warn!("Failed to release queue indexer {}: {e}", indexer.id());
    }
    if let Err(e) = committed {
        queue.reset_position();
        return Err(e);
    }

    let ids: Vec<u64> = items.iter().map(|item| item.queue_id).collect();
    queue.delete_items(&ids)?;
    log::debug!(
        "Applied {} of {} index events ({} failed)",
        report.applied,
        report.loaded,
        report.failed
    );
    Ok(report)
}

fn apply(indexer: &IndexerHandle, item: &QueueItem) -> Result<()> {
    match &item.event {
        IndexEvent::Update { key, fields } => {
            let fragment = fields
                .iter()
                .fold(ItemFragment::new(), |fragment, (name, value)| {
                    fragment.text(name.clone(), value.clone())
                });
            indexer.update(key, fragment, false)
        }
        IndexEvent::Delete { key } => indexer.delete(&[Some(key.clone())]),
    }
}

/// Handle to the background queue worker. Dropping it stops the worker.
pub struct QueueProcessor {
    engine: Arc<SearchEngine>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl QueueProcessor {
    /// Starts the worker thread.
    ///
    /// The worker drains the queue in batches of `batch_size`, then waits for
    /// new events or `poll_interval`, whichever comes first.
    ///
    /// # Errors
    ///
    /// `Io` when the thread cannot be spawned.
    pub fn spawn(
        engine: Arc<SearchEngine>,
        batch_size: usize,
        poll_interval: Duration,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let worker_engine = Arc::clone(&engine);
        let worker_stop = Arc::clone(&stop);
        let worker = thread::Builder::new()
            .name("quarry-queue".to_string())
            .spawn(move || run(&worker_engine, &worker_stop, batch_size, poll_interval))?;
        log::info!("Queue processor started (batch size {batch_size}, poll {poll_interval:?})");
        Ok(Self {
            engine,
            stop,
            worker: Some(worker),
        })
    }

    /// Returns `true` while the worker thread is alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Stops the worker and waits for it to exit.
    ///
    /// # Errors
    ///
    /// `IllegalState` when the worker panicked.
    pub fn stop(mut self) -> Result<()> {
        self.halt()
    }

    fn halt(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.stop.store(true, Ordering::SeqCst);
        self.engine.queue().poll_now();
        worker
            .join()
            .map_err(|_| Error::illegal_state("Queue processor thread panicked"))?;
        log::info!("Queue processor stopped");
        Ok(())
    }
}

impl Drop for QueueProcessor {
    fn drop(&mut self) {
        if let Err(e) = self.halt() {
            log::error!("{e}");
        }
    }
}

impl fmt::Debug for QueueProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueProcessor")
            .field("engine", &self.engine.backend_name())
            .field("running", &self.is_running())
            .finish()
    }
}

fn run(engine: &SearchEngine, stop: &AtomicBool, batch_size: usize, poll_interval: Duration) {
    while !stop.load(Ordering::SeqCst) {
        loop {
            match process_once(engine, batch_size) {
                Ok(report) if batch_size > 0 && report.loaded == batch_size => {
                    if stop.load(Ordering::SeqCst) {
                        return;
                    }
                }
                Ok(_) => break,
                Err(e) => {
                    log::warn!("Queue processing failed: {e}");
                    break;
                }
            }
        }
        if engine.queue().wait_for_poll(poll_interval) == WaitOutcome::Cancelled {
            break;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
