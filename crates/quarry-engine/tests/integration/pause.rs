//! Pause nesting and draining of live handles.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use quarry_core::{EngineState, Error, WaitOutcome};
use quarry_engine::DEFAULT_UNAVAILABLE_MESSAGE;

use crate::common::{TestHarness, eventually};

#[test]
fn test_pause_nesting_needs_matching_unpauses() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();

    for _ in 0..3 {
        assert_eq!(engine.pause(Duration::ZERO, Some("reindexing")), WaitOutcome::Completed);
    }
    for _ in 0..2 {
        engine.unpause();
        assert_eq!(engine.state(), EngineState::Paused);
        assert!(!engine.is_available(false));
        let err = engine.search_query().unwrap_err();
        assert!(matches!(err, Error::EngineUnavailable { ref message } if message == "reindexing"));
    }

    engine.unpause();
    assert_eq!(engine.state(), EngineState::Running);
    assert!(engine.is_available(false));
    let query = engine.search_query().unwrap();
    engine.release_search_query(&query).unwrap();
}

#[test]
fn test_pause_without_message_uses_default() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    engine.pause(Duration::ZERO, None);

    let err = engine.search_indexer().unwrap_err();
    assert!(matches!(
        err,
        Error::EngineUnavailable { ref message } if message == DEFAULT_UNAVAILABLE_MESSAGE
    ));
    assert!(err.is_retryable());
}

#[test]
fn test_paused_request_resumes_when_unpaused() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    engine.pause(Duration::ZERO, None);

    thread::scope(|scope| {
        let waiter = scope.spawn(|| engine.search_query());
        thread::sleep(Duration::from_millis(20));
        engine.unpause();
        let query = waiter.join().unwrap().unwrap();
        engine.release_search_query(&query).unwrap();
    });
}

#[test]
fn test_paused_request_times_out() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    engine.pause(Duration::ZERO, None);

    let started = Instant::now();
    assert!(engine.search_indexer().is_err());
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[test]
fn test_internal_handles_bypass_pause() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    engine.pause(Duration::ZERO, None);

    let indexer = engine.search_indexer_internal().unwrap();
    let query = engine.search_query_internal().unwrap();
    engine.release_search_indexer(&indexer).unwrap();
    engine.release_search_query(&query).unwrap();
}

#[test]
fn test_pause_waits_for_released_handles() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let indexer = engine.search_indexer().unwrap();
    let query = engine.search_query().unwrap();

    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(30));
            engine.release_search_indexer(&indexer).unwrap();
            engine.release_search_query(&query).unwrap();
        });
        assert_eq!(engine.pause(Duration::from_secs(2), None), WaitOutcome::Completed);
    });
    assert_eq!(engine.live_indexer_count(), 0);
    assert_eq!(harness.probe.released_indexers.load(Ordering::SeqCst), 1);
}

#[test]
fn test_pause_forces_release_after_budget() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let indexer = engine.search_indexer().unwrap();
    let query = engine.search_query().unwrap();

    assert_eq!(engine.pause(Duration::from_millis(40), None), WaitOutcome::TimedOut);
    assert_eq!(engine.live_indexer_count(), 0);
    assert_eq!(engine.live_query_count(), 0);
    assert!(indexer.is_closed());
    assert!(query.is_closed());
    assert!(matches!(
        engine.release_search_indexer(&indexer),
        Err(Error::IllegalState { .. })
    ));
}

#[test]
fn test_graceful_shutdown_when_handles_drain_in_time() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let indexers: Vec<_> = (0..2).map(|_| engine.search_indexer().unwrap()).collect();
    let queries: Vec<_> = (0..3).map(|_| engine.search_query().unwrap()).collect();

    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(30));
            for indexer in &indexers {
                engine.release_search_indexer(indexer).unwrap();
            }
            for query in &queries {
                engine.release_search_query(query).unwrap();
            }
        });
        engine.shutdown(false, true, None).unwrap();
    });

    assert_eq!(harness.probe.shutdown_flags(), [false]);
    assert_eq!(engine.state(), EngineState::Terminated);
}

#[test]
fn test_shutdown_escalates_when_handles_outlive_budget() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let indexers: Vec<_> = (0..2).map(|_| engine.search_indexer().unwrap()).collect();
    let queries: Vec<_> = (0..3).map(|_| engine.search_query().unwrap()).collect();

    engine.shutdown(false, true, None).unwrap();

    assert_eq!(harness.probe.shutdown_flags(), [true]);
    assert_eq!(engine.live_indexer_count(), 0);
    assert_eq!(engine.live_query_count(), 0);
    assert_eq!(harness.probe.released_indexers.load(Ordering::SeqCst), 2);
    assert_eq!(harness.probe.released_queries.load(Ordering::SeqCst), 3);
    assert!(indexers.iter().all(|indexer| indexer.is_closed()));
    assert!(queries.iter().all(|query| query.is_closed()));
}

#[test]
fn test_shutdown_during_outstanding_pause_escalates() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let indexer = engine.search_indexer().unwrap();

    thread::scope(|scope| {
        let pauser = scope.spawn(|| engine.pause(Duration::from_secs(3), None));
        assert!(eventually(Duration::from_secs(1), || engine.is_paused()));

        let started = Instant::now();
        engine.shutdown(false, false, None).unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(pauser.join().unwrap(), WaitOutcome::Completed);
    });

    assert_eq!(harness.probe.shutdown_flags(), [true]);
    assert!(indexer.is_closed());
    assert_eq!(engine.live_indexer_count(), 0);
}

#[test]
fn test_shutdown_after_pause_drains_internal_handles() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    engine.pause(Duration::ZERO, None);
    let indexer = engine.search_indexer_internal().unwrap();

    engine.shutdown(false, false, None).unwrap();

    assert_eq!(harness.probe.shutdown_flags(), [true]);
    assert!(indexer.is_closed());
    assert_eq!(harness.probe.released_indexers.load(Ordering::SeqCst), 1);
}

#[test]
fn test_nested_pause_waits_for_first_drain() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let indexer = engine.search_indexer().unwrap();

    thread::scope(|scope| {
        let first = scope.spawn(|| engine.pause(Duration::from_secs(3), None));
        assert!(eventually(Duration::from_secs(1), || engine.is_paused()));

        assert_eq!(engine.pause(Duration::from_millis(50), None), WaitOutcome::TimedOut);
        assert_eq!(engine.live_indexer_count(), 1);

        engine.release_search_indexer(&indexer).unwrap();
        assert_eq!(engine.pause(Duration::from_secs(2), None), WaitOutcome::Completed);
        assert_eq!(first.join().unwrap(), WaitOutcome::Completed);
    });

    for _ in 0..3 {
        engine.unpause();
    }
    assert_eq!(engine.state(), EngineState::Running);
}

#[test]
fn test_restart_while_paused_stays_paused() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    engine.pause(Duration::ZERO, Some("maintenance"));

    engine.restart().unwrap();
    assert_eq!(engine.state(), EngineState::Paused);

    engine.unpause();
    assert_eq!(engine.state(), EngineState::Running);
}

#[test]
fn test_unpause_without_pause_is_harmless() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    engine.unpause();
    assert_eq!(engine.state(), EngineState::Running);
    assert!(!engine.is_paused());
}

#[test]
fn test_status_carries_pause_message() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    engine.pause(Duration::ZERO, Some("rebuilding"));

    let status = engine.status();
    assert_eq!(status.running_status, "Paused");
    assert!(
        status
            .messages
            .iter()
            .any(|m| m.kind.as_deref() == Some("pause") && m.text == "rebuilding")
    );
}
