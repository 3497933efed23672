//! Viewer side of a relay

use std::sync::{Arc, OnceLock};

use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::camera::CameraId;
use crate::error::Error;

use super::frame::Frame;
use super::session::CameraSession;

/// One attached viewer of a camera relay
///
/// Receives frames in production order. A viewer that falls behind skips
/// straight to the newest frame instead of slowing the relay down.
///
/// Dropping the channel detaches the viewer; when the last viewer of a camera
/// goes away, the relay stops.
pub struct ViewerChannel {
    camera_id: CameraId,
    id: u64,
    rx: broadcast::Receiver<Frame>,
    /// End reason of the source this viewer was attached to
    end: Arc<OnceLock<Error>>,
    session: Arc<CameraSession>,
    skipped: u64,
}

impl ViewerChannel {
    pub(super) fn new(
        camera_id: CameraId,
        id: u64,
        rx: broadcast::Receiver<Frame>,
        end: Arc<OnceLock<Error>>,
        session: Arc<CameraSession>,
    ) -> Self {
        Self {
            camera_id,
            id,
            rx,
            end,
            session,
            skipped: 0,
        }
    }

    /// Camera this viewer is attached to
    pub fn camera_id(&self) -> CameraId {
        self.camera_id
    }

    /// Viewer id, unique within its session
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Frames skipped because this viewer fell behind
    pub fn skipped_frames(&self) -> u64 {
        self.skipped
    }

    /// Error that ended this viewer's relay, if it ended because of one
    ///
    /// Unaffected by later relays of the same camera.
    pub fn last_error(&self) -> Option<Error> {
        self.end.get().cloned()
    }

    /// Wait for the next frame
    ///
    /// Returns `None` once the relay has ended (upstream failure or
    /// shutdown). The viewer should then be detached.
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            match self.rx.recv().await {
                Ok(frame) => return Some(frame),
                Err(RecvError::Lagged(n)) => {
                    self.skipped += n;
                    tracing::trace!(
                        camera = %self.camera_id,
                        viewer = self.id,
                        skipped = n,
                        "Viewer lagging, skipped to latest frame"
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Turn the channel into a stream of frames
    ///
    /// The viewer stays attached until the stream is dropped.
    pub fn into_stream(self) -> impl Stream<Item = Frame> + Send + 'static {
        futures::stream::unfold(self, |mut viewer| async move {
            let frame = viewer.recv().await?;
            Some((frame, viewer))
        })
    }
}

impl Drop for ViewerChannel {
    fn drop(&mut self) {
        self.session.detach(self.id);
    }
}

impl std::fmt::Debug for ViewerChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerChannel")
            .field("camera_id", &self.camera_id)
            .field("id", &self.id)
            .field("skipped", &self.skipped)
            .finish()
    }
}
