//! Engine lifecycle state.
//!
//! ```text
//! Initialized --start--> Running --pause--> Paused --unpause--> Running
//! Running | Paused | Initialized --shutdown--> Terminating --> Terminated
//! Terminated --start/restart--> Running
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of the search engine in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineState {
    /// Engine was created but never started.
    Initialized,
    /// Engine is accepting indexer and query requests.
    Running,
    /// Engine is paused; handle requests block until unpaused.
    Paused,
    /// Engine is shutting down.
    Terminating,
    /// Engine has shut down.
    Terminated,
}

impl EngineState {
    /// The state name reported in status snapshots.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "Initialized",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Terminating => "Shutting down",
            Self::Terminated => "Shut down",
        }
    }

    /// Numeric code handed to backends that persist the engine state.
    pub fn code(self) -> i32 {
        match self {
            Self::Initialized => 0,
            Self::Running => 1,
            Self::Paused => 2,
            Self::Terminating => 3,
            Self::Terminated => 4,
        }
    }

    /// Inverse of [`code`](Self::code).
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Initialized),
            1 => Some(Self::Running),
            2 => Some(Self::Paused),
            3 => Some(Self::Terminating),
            4 => Some(Self::Terminated),
            _ => None,
        }
    }

    /// Returns `true` if indexer and query handles may be issued.
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns `true` if the engine is started, whether paused or not.
    pub fn is_started(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Returns `true` if a search admin may be requested.
    pub fn allows_admin(self) -> bool {
        matches!(self, Self::Initialized | Self::Running | Self::Paused)
    }

    /// Returns `true` if the engine is shutting down or has shut down.
    pub fn is_stopping(self) -> bool {
        matches!(self, Self::Terminating | Self::Terminated)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
