//! Engine status snapshots.

use serde::{Deserialize, Serialize};

use crate::state::EngineState;

/// One status line, optionally tagged with a message type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Message type (e.g. `"pause"`, `"index"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Message text.
    pub text: String,
}

impl StatusMessage {
    /// Untyped message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: None,
            text: text.into(),
        }
    }

    /// Typed message.
    pub fn typed(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            text: text.into(),
        }
    }
}

/// Point-in-time engine status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// One of the five engine state names.
    pub running_status: String,
    /// Index queue status code.
    pub queue_status: i32,
    /// Number of pending index events.
    pub queue_length: usize,
    /// Backend and controller messages.
    #[serde(default)]
    pub messages: Vec<StatusMessage>,
}

impl StatusSnapshot {
    /// Creates a snapshot with no messages.
    pub fn new(state: EngineState, queue_status: i32, queue_length: usize) -> Self {
        Self {
            running_status: state.to_string(),
            queue_status,
            queue_length,
            messages: Vec::new(),
        }
    }
}
