//! Error types
//!
//! Failures are scoped to one camera and one caller. `UnknownCamera` is a
//! client error, `ConnectError` is returned to whoever asked for the
//! connection, and `StreamEnded` is what viewers of a failed relay see.

use std::sync::Arc;
use std::time::Duration;

use crate::camera::CameraId;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for relay and snapshot operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// No camera record exists for the requested id
    #[error("camera {0} not found")]
    UnknownCamera(CameraId),

    /// The upstream connection could not be established
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// The upstream stream closed or produced an undecodable frame
    #[error(transparent)]
    StreamEnded(#[from] StreamEnded),

    /// The registry was shut down and accepts no new viewers
    #[error("relay is shutting down")]
    ShuttingDown,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error outside of an upstream connection (e.g. binding the server)
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

/// Failure to open an upstream frame source
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectError {
    /// The camera record does not form a valid connection URL
    #[error("invalid stream URL for camera {camera}: {reason}")]
    InvalidUrl { camera: CameraId, reason: String },

    /// The decoder process could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The remote end never delivered a first frame
    #[error("failed to open stream {url}: {reason}")]
    Handshake { url: String, reason: String },

    /// Opening the stream did not complete in time
    #[error("timed out after {0:?} opening stream")]
    Timeout(Duration),
}

/// Terminal end of an upstream stream
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamEnded {
    /// The remote end closed the stream
    #[error("stream closed by upstream")]
    Closed,

    /// The stream produced data that could not be turned into a frame
    #[error("frame decode failed: {0}")]
    Decode(String),

    /// Reading from the upstream failed
    #[error("stream read failed: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for StreamEnded {
    fn from(err: std::io::Error) -> Self {
        StreamEnded::Io(Arc::new(err))
    }
}

impl Error {
    /// Whether this error was caused by the request rather than the upstream
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::UnknownCamera(_))
    }
}
