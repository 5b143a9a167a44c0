//! Start, restart, shutdown, and registry behaviour.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use quarry_core::{EngineState, Error};

use crate::common::{TestHarness, mock_config};

#[test]
fn test_restart_twice_runs_two_full_cycles() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    assert_eq!(harness.probe.starts.load(Ordering::SeqCst), 1);

    engine.restart().unwrap();
    assert!(engine.is_available(false));
    engine.restart().unwrap();

    assert_eq!(harness.probe.starts.load(Ordering::SeqCst), 3);
    assert_eq!(harness.probe.shutdown_flags(), [false, false]);
    assert_eq!(engine.state(), EngineState::Running);
}

#[test]
fn test_start_when_running_is_noop() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    engine.start().unwrap();
    assert_eq!(harness.probe.starts.load(Ordering::SeqCst), 1);
    assert!(harness.probe.shutdown_flags().is_empty());
}

#[test]
fn test_restart_after_shutdown() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    engine.shutdown(false, true, None).unwrap();
    assert_eq!(engine.state(), EngineState::Terminated);

    engine.restart().unwrap();
    assert_eq!(engine.state(), EngineState::Running);
    assert_eq!(harness.probe.shutdown_flags(), [false]);
}

#[test]
fn test_shutdown_twice_is_noop() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    engine.shutdown(false, false, None).unwrap();
    engine.shutdown(true, false, Some("again")).unwrap();
    assert_eq!(harness.probe.shutdown_flags(), [false]);
}

#[test]
fn test_backend_shutdown_failure_still_terminates() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let admin = engine.search_admin(true).unwrap();
    harness.probe.failing_shutdowns.store(1, Ordering::SeqCst);

    let err = engine.shutdown(true, false, None).unwrap_err();
    assert!(matches!(err, Error::Index { .. }));
    assert_eq!(engine.state(), EngineState::Terminated);
    assert!(!engine.is_search_admin_locked());
    assert!(!engine.is_paused());
    drop(admin);
}

#[test]
fn test_state_code_follows_transitions() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    assert_eq!(
        harness.probe.state_code.load(Ordering::SeqCst),
        EngineState::Running.code()
    );
    engine.shutdown(false, false, None).unwrap();
    assert_eq!(
        harness.probe.state_code.load(Ordering::SeqCst),
        EngineState::Terminated.code()
    );
}

#[test]
fn test_stale_backend_is_stopped_on_initialize() {
    let harness = TestHarness::new();
    harness.probe.leave_running();

    let engine = harness.engine();
    assert_eq!(engine.state(), EngineState::Initialized);
    assert_eq!(harness.probe.shutdown_flags(), [true]);
    assert_eq!(
        harness.probe.state_code.load(Ordering::SeqCst),
        EngineState::Initialized.code()
    );
}

#[test]
fn test_stale_backend_gives_up_after_five_attempts() {
    let harness = TestHarness::new();
    harness.probe.leave_running();
    harness.probe.failing_shutdowns.store(10, Ordering::SeqCst);

    let err = harness.registry.initialize(&mock_config()).unwrap_err();
    assert!(matches!(err, Error::ShutdownFailed { attempts: 5 }));
    assert_eq!(harness.probe.shutdown_flags().len(), 5);
    assert!(harness.registry.try_instance().is_none());
}

#[test]
fn test_stale_backend_recovers_within_retries() {
    let harness = TestHarness::new();
    harness.probe.leave_running();
    harness.probe.failing_shutdowns.store(2, Ordering::SeqCst);

    harness.engine();
    assert_eq!(harness.probe.shutdown_flags(), [true, true, true]);
}

#[test]
fn test_initialize_force_stops_previous_instance() {
    let harness = TestHarness::new();
    let first = harness.running_engine();
    let second = harness.engine();

    assert_eq!(first.state(), EngineState::Terminated);
    assert_eq!(harness.probe.shutdown_flags(), [true]);
    assert!(Arc::ptr_eq(&harness.registry.instance().unwrap(), &second));
    assert!(Arc::ptr_eq(first.queue(), second.queue()));
}

#[test]
fn test_resync_starts_live_backend() {
    let harness = TestHarness::new();
    let engine = harness.engine();
    harness.probe.live.store(true, Ordering::SeqCst);

    assert!(engine.is_available(true));
    assert_eq!(engine.state(), EngineState::Running);
    assert_eq!(harness.probe.starts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_resync_stops_dead_backend() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    harness.probe.live.store(false, Ordering::SeqCst);

    assert!(!engine.is_available(false));
    assert_eq!(engine.state(), EngineState::Running);

    assert!(!engine.is_available(true));
    assert_eq!(engine.state(), EngineState::Terminated);
    assert_eq!(harness.probe.shutdown_flags(), [true]);

    let err = engine.search_query().unwrap_err();
    assert!(matches!(
        err,
        Error::EngineUnavailable { ref message } if message.ends_with("(search backend unavailable)")
    ));
}

#[test]
fn test_status_reports_state_and_queue() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let status = engine.status();
    assert_eq!(status.running_status, "Running");
    assert_eq!(status.queue_length, 0);
}
