//! Quarry Core — shared types, errors, and configuration.
//!
//! This crate provides the foundational types used across all Quarry crates.
//! It has no internal Quarry dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error taxonomy and Result alias
//! - [`key`]: Identifiers for indexable units
//! - [`fragment`]: Field values submitted for indexing
//! - [`row`]: Query result rows
//! - [`state`]: Engine lifecycle state
//! - [`status`]: Status snapshots
//! - [`config`]: Case-insensitive engine configuration
//! - [`wait`]: Bounded condition-variable waits

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod fragment;
pub mod key;
pub mod row;
pub mod state;
pub mod status;
pub mod wait;

// Re-export key types at crate root for convenience
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use fragment::{FieldValue, ItemFragment, StoredValue};
pub use key::{ChildLocator, ItemLocator, SearchKey, UNSET_REVISION};
pub use row::ResultRow;
pub use state::EngineState;
pub use status::{StatusMessage, StatusSnapshot};
pub use wait::WaitOutcome;
