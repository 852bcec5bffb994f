//! Configuration for the engine.

use std::time::Duration;

/// Configuration for a [`crate::StatsEngine`].
///
/// The two coalescing windows bound the outbound request rate: writes inside
/// a window collapse into one upsert. The background interval is the
/// eventual-consistency backstop and should stay materially longer than
/// either window.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Service configuration id passed to the remote store.
    pub config_id: String,
    /// Coalescing window for normal-priority flush requests.
    pub flush_window: Duration,
    /// Coalescing window for high-priority flush requests.
    pub priority_flush_window: Duration,
    /// Interval of the background sweep that flushes every dirty document.
    pub background_flush_interval: Duration,
}

impl EngineConfig {
    /// Creates a configuration with the default timing.
    pub fn new(config_id: impl Into<String>) -> Self {
        Self {
            config_id: config_id.into(),
            flush_window: Duration::from_secs(5),
            priority_flush_window: Duration::from_secs(1),
            background_flush_interval: Duration::from_secs(30),
        }
    }

    /// Sets the normal-priority coalescing window.
    pub fn with_flush_window(mut self, window: Duration) -> Self {
        self.flush_window = window;
        self
    }

    /// Sets the high-priority coalescing window.
    pub fn with_priority_flush_window(mut self, window: Duration) -> Self {
        self.priority_flush_window = window;
        self
    }

    /// Sets the background sweep interval.
    pub fn with_background_flush_interval(mut self, interval: Duration) -> Self {
        self.background_flush_interval = interval;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("")
    }
}
