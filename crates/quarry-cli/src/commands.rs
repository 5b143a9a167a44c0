//! Command handlers.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use quarry_core::{EngineConfig, ItemLocator, SearchKey};
use quarry_engine::memory::DATA_DIR_KEY;
use quarry_engine::{
    FieldDefinition, ItemDefinition, MEMORY_BACKEND, QueryRequest, SearchEngine, process_once,
};
use quarry_queue::{IndexQueue, QUEUE_PATH_KEY, QueueItem};

const QUEUE_FILE: &str = "queue.redb";

/// Loads the configuration file, or the in-memory backend when none is given,
/// and fills in data locations under `data_dir` where the file is silent.
pub fn load_config(path: Option<&Path>, data_dir: &Path) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => EngineConfig::for_backend(MEMORY_BACKEND),
    };
    if config.get(DATA_DIR_KEY).is_none() {
        config.set(DATA_DIR_KEY, data_dir.display().to_string());
    }
    if config.get(QUEUE_PATH_KEY).is_none() {
        config.set(QUEUE_PATH_KEY, data_dir.join(QUEUE_FILE).display().to_string());
    }
    Ok(config)
}

fn started_engine(config: &EngineConfig) -> Result<Arc<SearchEngine>> {
    let engine = quarry_engine::initialize(config)?;
    engine.start().context("Failed to start the search engine")?;
    Ok(engine)
}

fn stop(engine: &SearchEngine) -> Result<()> {
    engine.shutdown(false, true, None)?;
    Ok(())
}

/// `quarry status`
pub fn status(config: &EngineConfig) -> Result<()> {
    let engine = started_engine(config)?;
    println!("{}", serde_json::to_string_pretty(&engine.status())?);
    stop(&engine)
}

/// `quarry define`
pub fn define(
    config: &EngineConfig,
    content_type_id: i64,
    name: &str,
    fields: &[String],
    binary: &[String],
) -> Result<()> {
    if fields.is_empty() && binary.is_empty() {
        bail!("A content type needs at least one field");
    }
    let definition = fields
        .iter()
        .map(FieldDefinition::text)
        .chain(binary.iter().map(FieldDefinition::binary))
        .fold(ItemDefinition::new(content_type_id, name), |definition, field| {
            definition.with_field(field)
        });

    let engine = started_engine(config)?;
    let mut admin = engine.search_admin(true)?;
    let result = admin
        .update(definition, None, true)
        .and_then(|reindex| admin.save().map(|()| reindex));
    engine.release_search_admin(admin);
    let reindex = result?;

    tracing::info!(content_type_id, name, reindex, "Content type defined");
    if reindex {
        println!("Content type {content_type_id} changed; re-queue its items to reindex");
    }
    stop(&engine)
}

/// `quarry enqueue`
pub fn enqueue(
    config: &EngineConfig,
    key: SearchKey,
    delete: bool,
    fields: Vec<(String, String)>,
) -> Result<()> {
    let queue = IndexQueue::from_config(config)?;
    let item = if delete {
        QueueItem::delete(key)
    } else {
        if fields.is_empty() {
            bail!("An update needs at least one --field NAME=VALUE");
        }
        QueueItem::update(key, fields.into_iter().collect::<BTreeMap<_, _>>())
    };
    let id = queue.save_item(item)?;
    println!("{id}");
    Ok(())
}

/// Key addressed by `enqueue` arguments.
pub fn item_key(content_type_id: i64, content_id: i32, revision: i32) -> SearchKey {
    SearchKey::new(content_type_id, ItemLocator::new(content_id, revision))
}

/// `quarry queue`
pub fn queue(config: &EngineConfig, limit: usize) -> Result<()> {
    let queue = IndexQueue::from_config(config)?;
    let items = queue.load_items(limit)?;
    for item in &items {
        println!("{}", serde_json::to_string(item)?);
    }
    tracing::debug!(shown = items.len(), pending = queue.event_count()?, "Listed index events");
    Ok(())
}

/// `quarry purge`
pub fn purge(
    config: &EngineConfig,
    content_id: Option<i32>,
    content_type_id: Option<i64>,
) -> Result<()> {
    let queue = IndexQueue::from_config(config)?;
    let removed = match (content_id, content_type_id) {
        (Some(id), _) => queue.delete_id_items(id)?,
        (None, Some(type_id)) => queue.delete_type_id_items(type_id)?,
        (None, None) => queue.delete_all_items()?,
    };
    println!("Removed {removed} index events");
    Ok(())
}

/// `quarry index`
pub fn index(config: &EngineConfig, batch: usize) -> Result<()> {
    let engine = started_engine(config)?;
    let mut applied = 0;
    let mut failed = 0;
    loop {
        let report = process_once(&engine, batch)?;
        applied += report.applied;
        failed += report.failed;
        if report.loaded == 0 || batch == 0 || report.loaded < batch {
            break;
        }
    }
    println!("Applied {applied} index events, dropped {failed}");
    stop(&engine)
}

/// `quarry search`
pub fn search(
    config: &EngineConfig,
    text: &str,
    content_types: Vec<i64>,
    limit: Option<usize>,
) -> Result<()> {
    let mut request = QueryRequest::text(text);
    if !content_types.is_empty() {
        request = request.content_types(content_types);
    }
    if let Some(limit) = limit {
        request = request.limit(limit);
    }

    let engine = started_engine(config)?;
    let query = engine.search_query()?;
    let results = query.execute(&request);
    engine.release_search_query(&query)?;
    let results = results?;

    for row in &results.rows {
        println!("{}", serde_json::to_string(row)?);
    }
    if results.truncated {
        eprintln!("({} of {} matches shown)", results.rows.len(), results.total);
    }
    stop(&engine)
}

// ============================================================================
// Tests
// ============================================================================
