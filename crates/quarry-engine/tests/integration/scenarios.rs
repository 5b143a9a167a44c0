//! End-to-end scenarios across threads.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use quarry_core::{EngineState, Error, ItemLocator, SearchKey};
use quarry_queue::QueueItem;

use crate::common::{TestHarness, eventually, mock_config};

#[test]
fn test_instance_is_shared_across_threads() {
    let harness = TestHarness::new();
    let registry = &harness.registry;

    thread::scope(|scope| {
        let early = scope.spawn(|| registry.instance_timeout(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        let engine = registry.initialize(&mock_config()).unwrap();

        let first = scope.spawn(|| registry.instance().unwrap());
        let second = scope.spawn(|| registry.instance().unwrap());
        let first = first.join().unwrap();
        let second = second.join().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &engine));
        assert!(Arc::ptr_eq(&early.join().unwrap().unwrap(), &engine));
    });
}

#[test]
fn test_forced_shutdown_reclaims_outstanding_indexer() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let indexer = engine.search_indexer().unwrap();

    let started = Instant::now();
    thread::scope(|scope| {
        scope
            .spawn(|| engine.shutdown(true, true, Some("maintenance")))
            .join()
            .unwrap()
            .unwrap();
    });
    assert!(started.elapsed() < Duration::from_secs(11));

    assert_eq!(engine.state(), EngineState::Terminated);
    assert!(indexer.is_closed());
    assert_eq!(engine.live_indexer_count(), 0);
    assert_eq!(harness.probe.released_indexers.load(Ordering::SeqCst), 1);
    assert_eq!(harness.probe.shutdown_flags(), [true]);

    let err = engine.search_indexer().unwrap_err();
    assert!(matches!(
        err,
        Error::EngineUnavailable { ref message } if message.ends_with("(maintenance)")
    ));
    assert_eq!(engine.status().running_status, "Shut down");
}

#[test]
fn test_locked_admin_handoff_between_threads() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let first = engine.search_admin(true).unwrap();

    let (refused_tx, refused_rx) = mpsc::channel();
    thread::scope(|scope| {
        let contender = scope.spawn(|| {
            let refused = engine.search_admin(true).unwrap_err();
            refused_tx.send(refused).unwrap();
            let mut acquired = None;
            assert!(eventually(Duration::from_secs(2), || {
                acquired = engine.search_admin(true).ok();
                acquired.is_some()
            }));
            acquired.unwrap()
        });

        let refused = refused_rx.recv().unwrap();
        assert!(matches!(refused, Error::AdminLocked { .. }));
        engine.release_search_admin(first);

        let second = contender.join().unwrap();
        assert!(second.is_locked());
        engine.release_search_admin(second);
    });
    assert!(!engine.is_search_admin_locked());
}

#[test]
fn test_queue_delivers_in_order_and_forgets_deleted() {
    let harness = TestHarness::new();
    let engine = harness.engine();
    let queue = engine.queue();

    let first = queue
        .save_item(QueueItem::delete(SearchKey::new(311, ItemLocator::new(1, 1))))
        .unwrap();
    let second = queue
        .save_item(QueueItem::delete(SearchKey::new(311, ItemLocator::new(2, 1))))
        .unwrap();

    let loaded: Vec<u64> = queue
        .load_items(0)
        .unwrap()
        .iter()
        .map(|item| item.queue_id)
        .collect();
    assert_eq!(loaded, [first, second]);

    queue.delete_items(&[first]).unwrap();
    queue.reset_position();
    let loaded = queue.load_items(0).unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].queue_id, second);
    assert_eq!(loaded[0].content_id, 2);
}
