//! Quarry Engine — the search engine lifecycle controller.
//!
//! A [`SearchEngine`] fronts one pluggable [`EngineBackend`]. It owns the
//! engine state machine, issues indexer, query, and admin handles, tracks the
//! live ones, and drains them on pause and shutdown.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  EngineRegistry (process-wide current engine)                 │
//! │  └── SearchEngine (state, pause counter, admin lock)          │
//! │      ├── IndexerHandle / QueryHandle (tracked, drainable)     │
//! │      ├── SearchAdmin (locked or read-only)                    │
//! │      ├── IndexQueue (from quarry-queue)                       │
//! │      └── EngineBackend (resolved by name via BackendRegistry) │
//! │          └── MemoryEngine (built-in "memory" backend)         │
//! ├───────────────────────────────────────────────────────────────┤
//! │  QueueProcessor (applies queued index events)                 │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use quarry_core::EngineConfig;
//! use quarry_engine::{QueryRequest, initialize};
//!
//! let engine = initialize(&EngineConfig::for_backend("memory"))?;
//! engine.start()?;
//!
//! let query = engine.search_query()?;
//! let results = query.execute(&QueryRequest::text("granite"))?;
//! engine.release_search_query(&query)?;
//! ```

#![forbid(unsafe_code)]

pub mod admin;
pub mod backend;
pub mod content_type;
pub mod engine;
pub mod handles;
pub mod indexer;
pub mod memory;
pub mod processor;
pub mod query;
pub mod registry;
pub mod settings;

mod proptests;

pub use admin::{AdminBackend, SearchAdmin};
pub use backend::{BackendContext, EngineBackend};
pub use content_type::{ContentTypeRegistry, FieldDefinition, FieldRetriever, ItemDefinition};
pub use engine::SearchEngine;
pub use handles::HandleId;
pub use indexer::{IndexerHandle, SearchIndexer};
pub use memory::{MemoryEngine, MemorySettings};
pub use processor::{BatchReport, QueueProcessor, process_once};
pub use query::{QueryHandle, QueryRequest, QueryResults, SearchQuery};
pub use registry::{
    BackendFactory, BackendRegistry, EngineRegistry, MEMORY_BACKEND, global, initialize, instance,
};
pub use settings::{ControllerSettings, DEFAULT_UNAVAILABLE_MESSAGE};
