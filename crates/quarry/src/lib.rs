//! Quarry search front-end — umbrella crate.
//!
//! This crate re-exports all Quarry components for convenience.
//! Use feature flags to enable specific functionality.

#![doc = include_str!("../README.md")]

pub use quarry_core as core;
pub use quarry_queue as queue;

#[cfg(feature = "engine")]
pub use quarry_engine as engine;

#[cfg(feature = "engine")]
pub use quarry_engine::{initialize, instance};
