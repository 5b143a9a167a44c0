//! Controller wait budgets and user-facing messages.

use std::time::Duration;

use quarry_core::{EngineConfig, Result};

/// Config key: how long handle requests wait while paused (ms).
pub const PAUSE_WAIT_KEY: &str = "pausewaitms";
/// Config key: drain budget for a graceful shutdown (ms).
pub const DRAIN_WAIT_KEY: &str = "drainwaitms";
/// Config key: how long shutdown waits for a locked admin (ms).
pub const ADMIN_WAIT_KEY: &str = "adminwaitms";
/// Config key: message returned when the engine is unavailable.
pub const UNAVAILABLE_MESSAGE_KEY: &str = "unavailablemessage";

/// Default message returned to callers while the engine is unavailable.
pub const DEFAULT_UNAVAILABLE_MESSAGE: &str = "Search server unavailable, try again in a minute.";

/// Timeouts and messages used by [`SearchEngine`](crate::SearchEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Bound on handle requests blocked by a pause.
    pub pause_wait: Duration,
    /// Budget for draining live handles on a graceful shutdown.
    pub drain_wait: Duration,
    /// Bound on waiting for a locked admin during shutdown.
    pub admin_wait: Duration,
    /// Message for unavailability errors when no pause message is set.
    pub unavailable_message: String,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            pause_wait: Duration::from_secs(60),
            drain_wait: Duration::from_secs(10),
            admin_wait: Duration::from_secs(10),
            unavailable_message: DEFAULT_UNAVAILABLE_MESSAGE.to_string(),
        }
    }
}

impl ControllerSettings {
    /// Reads settings from configuration, defaulting anything unset.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            pause_wait: config.get_duration_ms(PAUSE_WAIT_KEY, defaults.pause_wait)?,
            drain_wait: config.get_duration_ms(DRAIN_WAIT_KEY, defaults.drain_wait)?,
            admin_wait: config.get_duration_ms(ADMIN_WAIT_KEY, defaults.admin_wait)?,
            unavailable_message: config
                .get(UNAVAILABLE_MESSAGE_KEY)
                .map(str::to_string)
                .unwrap_or(defaults.unavailable_message),
        })
    }
}
