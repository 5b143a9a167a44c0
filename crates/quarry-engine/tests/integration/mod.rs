//! Integration tests for quarry-engine.

mod admin;
mod handles;
mod lifecycle;
mod pause;
mod scenarios;
