//! Registry configuration

use std::time::Duration;

/// Relay registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Frames a viewer may fall behind before its oldest frame is replaced
    pub viewer_buffer: usize,

    /// Interval of the background sweep that removes leftover idle sessions
    pub cleanup_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            viewer_buffer: 1,
            cleanup_interval: Duration::from_secs(30),
        }
    }
}

impl RegistryConfig {
    /// Set the per-viewer buffer (at least one frame)
    pub fn viewer_buffer(mut self, frames: usize) -> Self {
        self.viewer_buffer = frames.max(1);
        self
    }

    /// Set the cleanup sweep interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}
