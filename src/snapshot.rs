//! One-shot frame capture
//!
//! Snapshots open their own short-lived frame source and never touch the
//! relay registry, so they neither join nor disturb a running relay.

use bytes::Bytes;

use crate::camera::{redacted, CameraDirectory, CameraId, CameraRecord};
use crate::error::{Error, Result};
use crate::source::{FrameSource, FrameSourceConnector};

/// Capture a single JPEG frame from a camera
pub async fn snapshot<D, C>(directory: &D, connector: &C, camera_id: CameraId) -> Result<Bytes>
where
    D: CameraDirectory,
    C: FrameSourceConnector,
{
    let record = directory
        .get_camera(camera_id)
        .await
        .ok_or(Error::UnknownCamera(camera_id))?;

    capture(connector, &record).await
}

/// Open a throwaway source for `record`, read one frame and close it
///
/// The source is closed whether or not the read succeeds.
pub async fn capture<C: FrameSourceConnector>(connector: &C, record: &CameraRecord) -> Result<Bytes> {
    let url = record.connection_url()?;
    tracing::debug!(camera = %record.id, url = %redacted(&url), "Capturing snapshot");

    let mut source = connector.open(&url).await?;
    let frame = source.read_frame().await;
    source.close().await;

    let frame = frame?;
    tracing::debug!(camera = %record.id, bytes = frame.len(), "Snapshot captured");
    Ok(frame)
}

/// Check that a camera is reachable and delivers frames
///
/// Used to validate a record before it is saved or served.
pub async fn probe<C: FrameSourceConnector>(connector: &C, record: &CameraRecord) -> Result<()> {
    match capture(connector, record).await {
        Ok(_) => {
            tracing::info!(camera = %record.id, host = %record.host, "Camera probe succeeded");
            Ok(())
        }
        Err(err) => {
            tracing::warn!(camera = %record.id, host = %record.host, error = %err, "Camera probe failed");
            Err(err)
        }
    }
}
