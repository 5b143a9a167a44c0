//! Admin lock, read-only sessions, and admin-triggered restarts.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use quarry_core::{EngineState, Error, FieldValue, Result, SearchKey};
use quarry_engine::{FieldDefinition, FieldRetriever, ItemDefinition};

use crate::common::{TestHarness, eventually};

fn article() -> ItemDefinition {
    ItemDefinition::new(311, "article").with_field(FieldDefinition::text("title"))
}

#[test]
fn test_second_locked_admin_is_refused() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();

    let first = engine.search_admin(true).unwrap();
    for _ in 0..3 {
        let err = engine.search_admin(true).unwrap_err();
        assert!(matches!(
            err,
            Error::AdminLocked { ref owner } if owner == &format!("MockEngine admin {}", first.id())
        ));
    }
    assert!(engine.is_search_admin_locked());

    engine.release_search_admin(first);
    assert!(!engine.is_search_admin_locked());
    let second = engine.search_admin(true).unwrap();
    engine.release_search_admin(second);
}

#[test]
fn test_unlocked_admins_are_read_only() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let locked = engine.search_admin(true).unwrap();

    let mut reader = engine.search_admin(false).unwrap();
    assert!(!reader.is_locked());
    assert!(matches!(
        reader.update(article(), None, true),
        Err(Error::IllegalState { .. })
    ));
    assert!(matches!(reader.save(), Err(Error::IllegalState { .. })));
    assert!(matches!(
        reader.field_retriever(311),
        Err(Error::UnknownContentType { content_type_id: 311 })
    ));

    engine.release_search_admin(reader);
    assert!(engine.is_search_admin_locked());
    engine.release_search_admin(locked);
}

#[test]
fn test_dropped_locked_admin_frees_lock() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    {
        let _admin = engine.search_admin(true).unwrap();
        assert!(engine.is_search_admin_locked());
    }
    assert!(!engine.is_search_admin_locked());
}

#[test]
fn test_admin_refused_after_shutdown() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    engine.shutdown(false, false, None).unwrap();
    assert!(matches!(
        engine.search_admin(false),
        Err(Error::IllegalState { .. })
    ));
}

#[test]
fn test_admin_available_before_start() {
    let harness = TestHarness::new();
    let engine = harness.engine();
    let admin = engine.search_admin(true).unwrap();
    engine.release_search_admin(admin);
}

#[test]
fn test_update_registers_definition_and_retriever() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let mut admin = engine.search_admin(true).unwrap();

    let retriever: Arc<dyn FieldRetriever> =
        Arc::new(|_: &SearchKey, _: &str| -> Result<Option<FieldValue>> { Ok(None) });
    assert!(!admin.update(article(), Some(retriever), true).unwrap());
    assert!(admin.field_retriever(311).unwrap().is_some());
    assert!(engine.content_types().contains(311));

    admin.delete(Some(311)).unwrap();
    assert!(!engine.content_types().contains(311));
    engine.release_search_admin(admin);
}

#[test]
fn test_rebuild_reports_processed_ids_only() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let mut admin = engine.search_admin(true).unwrap();
    assert_eq!(admin.rebuild_indexes(&[311, -1, 42]).unwrap(), [311, 42]);
    assert_eq!(admin.optimize_indexes(&[311]).unwrap(), [311]);
    admin.verify(&[311]).unwrap();
    engine.release_search_admin(admin);
}

#[test]
fn test_save_can_restart_engine() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    harness.probe.restart_on_save.store(true, Ordering::SeqCst);

    let mut admin = engine.search_admin(true).unwrap();
    admin.update(article(), None, false).unwrap();
    admin.save().unwrap();

    assert_eq!(harness.probe.starts.load(Ordering::SeqCst), 2);
    assert_eq!(harness.probe.shutdown_flags(), [false]);
    assert_eq!(engine.state(), EngineState::Running);
    engine.release_search_admin(admin);
}

#[test]
fn test_shutdown_waits_for_locked_admin() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let admin = engine.search_admin(true).unwrap();

    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(30));
            engine.release_search_admin(admin);
        });
        engine.shutdown(false, true, None).unwrap();
    });
    assert_eq!(harness.probe.shutdown_flags(), [false]);
}

#[test]
fn test_restart_refused_while_shutting_down() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let admin = engine.search_admin(true).unwrap();

    thread::scope(|scope| {
        let stopper = scope.spawn(|| engine.shutdown(false, true, None));
        assert!(eventually(Duration::from_secs(1), || {
            engine.state() == EngineState::Terminating
        }));

        let started = Instant::now();
        let err = engine.restart().unwrap_err();
        assert!(matches!(err, Error::IllegalState { .. }));
        assert!(started.elapsed() < Duration::from_millis(200));

        engine.release_search_admin(admin);
        stopper.join().unwrap().unwrap();
    });

    assert_eq!(engine.state(), EngineState::Terminated);
    assert_eq!(harness.probe.starts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_admin_restart_refused_while_shutdown_waits_for_it() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    harness.probe.restart_on_save.store(true, Ordering::SeqCst);
    let mut admin = engine.search_admin(true).unwrap();

    thread::scope(|scope| {
        let stopper = scope.spawn(|| engine.shutdown(false, true, None));
        assert!(eventually(Duration::from_secs(1), || {
            engine.state() == EngineState::Terminating
        }));

        let err = admin.save().unwrap_err();
        assert!(matches!(err, Error::IllegalState { .. }));

        engine.release_search_admin(admin);
        stopper.join().unwrap().unwrap();
    });

    assert_eq!(harness.probe.shutdown_flags(), [false]);
    assert_eq!(engine.state(), EngineState::Terminated);
}

#[test]
fn test_shutdown_forces_past_stuck_admin() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let admin = engine.search_admin(true).unwrap();

    let started = Instant::now();
    engine.shutdown(false, true, Some("upgrade")).unwrap();
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(harness.probe.shutdown_flags(), [true]);
    assert!(!engine.is_search_admin_locked());
    drop(admin);
}

#[test]
fn test_shutdown_without_admin_check_ignores_lock() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let admin = engine.search_admin(true).unwrap();

    let started = Instant::now();
    engine.shutdown(false, false, None).unwrap();
    assert!(started.elapsed() < Duration::from_millis(300));
    assert_eq!(harness.probe.shutdown_flags(), [false]);
    drop(admin);
}

#[test]
fn test_status_names_admin_owner() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let admin = engine.search_admin(true).unwrap();

    let status = engine.status();
    let expected = format!("Locked by MockEngine admin {}", admin.id());
    assert!(
        status
            .messages
            .iter()
            .any(|m| m.kind.as_deref() == Some("admin") && m.text == expected)
    );
    engine.release_search_admin(admin);
}
