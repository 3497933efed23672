//! HTTP routes
//!
//! - `GET /video_feed/{camera_id}`: live MJPEG (`multipart/x-mixed-replace`)
//! - `GET /snapshot/{camera_id}`: single JPEG
//! - `GET /cameras`: camera listing, credentials left out

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::camera::{CameraDirectory, CameraId, CameraRecord};
use crate::error::Error;
use crate::registry::RelayRegistry;
use crate::snapshot::snapshot;
use crate::source::FrameSourceConnector;

use super::config::ServerConfig;

/// Multipart boundary separating frames of a video feed
pub const BOUNDARY: &str = "frame";

const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";
const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// State shared by every request handler
pub struct AppState<D, C> {
    registry: Arc<RelayRegistry<D, C>>,
    stream_limit: Option<Arc<Semaphore>>,
}

impl<D, C> Clone for AppState<D, C> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            stream_limit: self.stream_limit.clone(),
        }
    }
}

impl<D: CameraDirectory, C: FrameSourceConnector> AppState<D, C> {
    /// Create handler state; `max_streams` of `config` caps concurrent video feeds
    pub fn new(registry: Arc<RelayRegistry<D, C>>, config: &ServerConfig) -> Self {
        let stream_limit = (config.max_streams > 0).then(|| Arc::new(Semaphore::new(config.max_streams)));

        Self {
            registry,
            stream_limit,
        }
    }

    /// Get a reference to the relay registry
    pub fn registry(&self) -> &Arc<RelayRegistry<D, C>> {
        &self.registry
    }
}

/// Build the application router
pub fn router<D: CameraDirectory, C: FrameSourceConnector>(state: AppState<D, C>) -> Router {
    Router::new()
        .route("/video_feed/{camera_id}", get(video_feed::<D, C>))
        .route("/snapshot/{camera_id}", get(snapshot_jpeg::<D, C>))
        .route("/cameras", get(list_cameras::<D, C>))
        .with_state(state)
}

/// Camera as shown to clients
#[derive(Debug, Clone, Serialize)]
pub struct CameraSummary {
    pub id: CameraId,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub location: Option<String>,
    pub has_credentials: bool,
}

impl From<&CameraRecord> for CameraSummary {
    fn from(record: &CameraRecord) -> Self {
        Self {
            id: record.id,
            host: record.host.clone(),
            port: record.port,
            path: record.path.clone(),
            location: record.location.clone(),
            has_credentials: record.credentials.is_some(),
        }
    }
}

/// Encode one JPEG as a multipart part
pub fn multipart_chunk(jpeg: &[u8]) -> Bytes {
    const HEAD: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

    let mut part = BytesMut::with_capacity(HEAD.len() + jpeg.len() + 2);
    part.put_slice(HEAD);
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

async fn video_feed<D: CameraDirectory, C: FrameSourceConnector>(
    State(state): State<AppState<D, C>>,
    Path(camera_id): Path<u64>,
) -> Result<Response, Error> {
    let camera_id = CameraId::new(camera_id);

    let permit: Option<OwnedSemaphorePermit> = match &state.stream_limit {
        Some(limit) => match Arc::clone(limit).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(camera = %camera_id, "Video feed rejected: limit reached");
                return Ok((StatusCode::SERVICE_UNAVAILABLE, "too many open video feeds").into_response());
            }
        },
        None => None,
    };

    let viewer = state.registry.attach(camera_id).await?;

    // The viewer (and permit) live as long as the response body
    let parts = futures::stream::unfold((viewer, permit), |(mut viewer, permit)| async move {
        let frame = viewer.recv().await?;
        Some((Ok::<_, Infallible>(multipart_chunk(&frame.data)), (viewer, permit)))
    });

    Ok((
        [
            (header::CONTENT_TYPE, MULTIPART_CONTENT_TYPE),
            (header::CACHE_CONTROL, NO_CACHE),
            (header::PRAGMA, "no-cache"),
        ],
        Body::from_stream(parts),
    )
        .into_response())
}

async fn snapshot_jpeg<D: CameraDirectory, C: FrameSourceConnector>(
    State(state): State<AppState<D, C>>,
    Path(camera_id): Path<u64>,
) -> Result<Response, Error> {
    let registry = &state.registry;
    let image = snapshot(&**registry.directory(), &**registry.connector(), CameraId::new(camera_id)).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, NO_CACHE),
        ],
        image,
    )
        .into_response())
}

async fn list_cameras<D: CameraDirectory, C: FrameSourceConnector>(
    State(state): State<AppState<D, C>>,
) -> Json<Vec<CameraSummary>> {
    let cameras = state.registry.cameras().await;
    Json(cameras.iter().map(CameraSummary::from).collect())
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::NOT_FOUND
        } else if matches!(self, Error::ShuttingDown) {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            tracing::warn!(error = %self, "Request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };

        (status, self.to_string()).into_response()
    }
}
