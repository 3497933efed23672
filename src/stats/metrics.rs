//! Statistics and metrics for camera relay sessions

use std::time::Duration;

use serde::Serialize;

use crate::camera::CameraId;
use crate::registry::SessionState;

/// Per-camera session statistics
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Camera the session relays
    pub camera_id: CameraId,
    /// Current state
    pub state: SessionState,
    /// Attached viewers
    pub viewers: usize,
    /// Frames read from upstream over the session's lifetime
    pub frames_produced: u64,
    /// Encoded bytes read from upstream
    pub bytes_produced: u64,
    /// Frames read from the current source
    pub frames_since_open: u64,
    /// Bytes read from the current source
    pub bytes_since_open: u64,
    /// Number of times a frame source was opened
    pub sources_opened: u64,
    /// Time since the current source was opened, while active
    pub active_for: Option<Duration>,
    /// Most recent connect or stream error
    pub last_error: Option<String>,
}

impl SessionStats {
    /// Frames per second since the current source was opened
    pub fn framerate(&self) -> f64 {
        match self.active_for {
            Some(d) if d.as_secs_f64() > 0.0 => self.frames_since_open as f64 / d.as_secs_f64(),
            _ => 0.0,
        }
    }

    /// Bitrate estimate in bits per second
    pub fn bitrate(&self) -> u64 {
        match self.active_for {
            Some(d) if d.as_secs() > 0 => (self.bytes_since_open * 8) / d.as_secs(),
            _ => 0,
        }
    }
}

/// Registry-wide statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct RelayStats {
    /// Registered sessions
    pub sessions: usize,
    /// Sessions with an open frame source
    pub active_sessions: usize,
    /// Viewers across all cameras
    pub viewers: usize,
    /// Frames read across all sessions
    pub frames_produced: u64,
    /// Bytes read across all sessions
    pub bytes_produced: u64,
}

impl RelayStats {
    /// Aggregate per-session statistics
    pub fn from_sessions(sessions: impl IntoIterator<Item = SessionStats>) -> Self {
        sessions.into_iter().fold(Self::default(), |mut acc, s| {
            acc.sessions += 1;
            if s.state == SessionState::Active {
                acc.active_sessions += 1;
            }
            acc.viewers += s.viewers;
            acc.frames_produced += s.frames_produced;
            acc.bytes_produced += s.bytes_produced;
            acc
        })
    }
}
