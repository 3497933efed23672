//! Frame source adapters
//!
//! A frame source owns exactly one upstream connection and turns it into a
//! pull-based sequence of JPEG frames:
//! - [`FrameSourceConnector::open`] establishes the connection
//! - [`FrameSource::read_frame`] pulls the next encoded frame
//! - [`FrameSource::close`] releases the connection (idempotent)
//!
//! Sources hold no frame history. Backpressure is the caller's concern.

use std::future::Future;

use bytes::Bytes;
use url::Url;

use crate::error::{ConnectError, StreamEnded};

pub mod ffmpeg;
pub mod jpeg;

#[cfg(test)]
pub(crate) mod testing;

pub use ffmpeg::{FfmpegConfig, FfmpegConnector, FfmpegSource};
pub use jpeg::JpegReader;

/// An open upstream stream producing encoded frames
pub trait FrameSource: Send + 'static {
    /// Pull the next encoded frame
    ///
    /// `StreamEnded` is terminal: the source must not be read again, only
    /// closed.
    fn read_frame(&mut self) -> impl Future<Output = Result<Bytes, StreamEnded>> + Send;

    /// Release the upstream connection
    ///
    /// Safe to call more than once and after `StreamEnded`.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Opens frame sources for stream URLs
pub trait FrameSourceConnector: Send + Sync + 'static {
    /// Source type produced by this connector
    type Source: FrameSource;

    /// Connect to `url`
    ///
    /// Fails with `ConnectError` if the transport cannot be established or
    /// the remote end never acknowledges.
    fn open(&self, url: &Url) -> impl Future<Output = Result<Self::Source, ConnectError>> + Send;
}
