//! Handle issuance, release pairing, and field filtering.

use std::sync::atomic::Ordering;

use quarry_core::{ChildLocator, Error, ItemFragment, ItemLocator, SearchKey};
use quarry_engine::{FieldDefinition, ItemDefinition, QueryRequest};

use crate::common::TestHarness;

fn article() -> ItemDefinition {
    ItemDefinition::new(311, "article")
        .with_field(FieldDefinition::text("title"))
        .with_field(FieldDefinition::text("internal_notes").hidden())
        .with_field(FieldDefinition::text("caption").in_child(7))
}

#[test]
fn test_release_pairs_exactly_once() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();

    let indexer = engine.search_indexer().unwrap();
    let query = engine.search_query().unwrap();
    assert_eq!(engine.live_indexer_count(), 1);
    assert_eq!(engine.live_query_count(), 1);

    engine.release_search_indexer(&indexer).unwrap();
    engine.release_search_query(&query).unwrap();
    assert_eq!(engine.live_indexer_count(), 0);
    assert_eq!(engine.live_query_count(), 0);
    assert_eq!(harness.probe.released_indexers.load(Ordering::SeqCst), 1);
    assert_eq!(harness.probe.released_queries.load(Ordering::SeqCst), 1);

    assert!(matches!(
        engine.release_search_indexer(&indexer),
        Err(Error::IllegalState { .. })
    ));
    assert!(matches!(
        engine.release_search_query(&query),
        Err(Error::IllegalState { .. })
    ));
    assert_eq!(harness.probe.released_indexers.load(Ordering::SeqCst), 1);
}

#[test]
fn test_release_of_foreign_handle_is_illegal() {
    let first = TestHarness::new();
    let second = TestHarness::new();
    let engine_a = first.running_engine();
    let engine_b = second.running_engine();

    let indexer = engine_a.search_indexer().unwrap();
    let err = engine_b.release_search_indexer(&indexer).unwrap_err();
    assert!(matches!(err, Error::IllegalState { .. }));
    assert!(!err.is_retryable());

    // Still tracked by its own engine
    assert_eq!(engine_a.live_indexer_count(), 1);
    engine_a.release_search_indexer(&indexer).unwrap();
}

#[test]
fn test_released_handles_are_closed() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    engine.content_types().register(article(), None);

    let indexer = engine.search_indexer().unwrap();
    let query = engine.search_query().unwrap();
    engine.release_search_indexer(&indexer).unwrap();
    engine.release_search_query(&query).unwrap();

    assert!(indexer.is_closed());
    assert!(matches!(
        indexer.update(
            &SearchKey::new(311, ItemLocator::new(1, 1)),
            ItemFragment::new(),
            false
        ),
        Err(Error::Closed { handle: "SearchIndexer" })
    ));
    assert!(matches!(
        query.execute(&QueryRequest::text("granite")),
        Err(Error::Closed { handle: "SearchQuery" })
    ));
}

#[test]
fn test_update_drops_undefined_and_hidden_fields() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    engine.content_types().register(article(), None);
    let indexer = engine.search_indexer().unwrap();

    let parent = SearchKey::new(311, ItemLocator::new(42, 3));
    let fragment = || {
        ItemFragment::new()
            .text("title", "Granite")
            .text("internal_notes", "draft")
            .text("caption", "A quarry")
            .text("unknown", "x")
    };
    indexer.update(&parent, fragment(), false).unwrap();
    let child = parent.with_child(ChildLocator::new(7, 1));
    indexer.update(&child, fragment(), false).unwrap();

    let updates = harness.probe.updates.lock().unwrap().clone();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].0, parent);
    assert_eq!(updates[0].1, ["title"]);
    assert_eq!(updates[1].0, child);
    assert_eq!(updates[1].1, ["caption"]);

    engine.release_search_indexer(&indexer).unwrap();
}

#[test]
fn test_update_of_unknown_content_type() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let indexer = engine.search_indexer().unwrap();

    let err = indexer
        .update(
            &SearchKey::new(999, ItemLocator::new(1, 1)),
            ItemFragment::new().text("title", "x"),
            true,
        )
        .unwrap_err();
    assert!(matches!(err, Error::UnknownContentType { content_type_id: 999 }));
    engine.release_search_indexer(&indexer).unwrap();
}

#[test]
fn test_delete_ignores_missing_keys() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let indexer = engine.search_indexer().unwrap();
    indexer
        .delete(&[None, Some(SearchKey::new(311, ItemLocator::new(1, 1))), None])
        .unwrap();
    indexer.delete(&[None]).unwrap();
    engine.release_search_indexer(&indexer).unwrap();
}

#[test]
fn test_close_is_idempotent_and_release_still_pairs() {
    let harness = TestHarness::new();
    let engine = harness.running_engine();
    let indexer = engine.search_indexer().unwrap();
    indexer.close(true).unwrap();
    indexer.close(false).unwrap();
    assert!(indexer.commit().is_err());
    engine.release_search_indexer(&indexer).unwrap();
}

#[test]
fn test_handles_refused_before_start() {
    let harness = TestHarness::new();
    let engine = harness.engine();
    assert!(matches!(
        engine.search_indexer(),
        Err(Error::EngineUnavailable { .. })
    ));
    assert!(matches!(
        engine.search_query_internal(),
        Err(Error::EngineUnavailable { .. })
    ));
}
