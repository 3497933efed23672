//! Per-camera relay session
//!
//! A session owns at most one frame source for its camera. The first viewer
//! starts it, the last viewer to leave stops it, and an upstream failure ends
//! it for everybody. Nothing reconnects on its own: the next attach after a
//! teardown opens a fresh source.
//!
//! ```text
//!            attach (first)          open ok
//!   Idle ─────────────────► Starting ───────► Active
//!    ▲ ▲                      │ open failed     │ │
//!    │ └──────────────────────┘                 │ │ last viewer detached
//!    │ └────────────────────────────────────────┘ │
//!    │          source closed                     │ StreamEnded
//!    └─────────────────────────────────────── Failed
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::camera::{redacted, CameraId, CameraRecord};
use crate::error::{Error, Result, StreamEnded};
use crate::source::{FrameSource, FrameSourceConnector};
use crate::stats::SessionStats;

use super::frame::Frame;
use super::store::SessionMap;
use super::viewer::ViewerChannel;

/// Observable state of a camera session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No frame source
    Idle,
    /// Frame source is being opened
    Starting,
    /// Frame source is producing frames for viewers
    Active,
    /// Upstream ended; viewers were notified and the source is being closed
    Failed,
}

/// Production loop task of one opened source
struct Producer {
    generation: u64,
    handle: JoinHandle<()>,
}

enum Phase {
    /// `draining` holds a stopped producer still closing its source
    Idle { draining: Option<Producer> },
    Starting,
    Active {
        producer: Producer,
        tx: broadcast::Sender<Frame>,
        stop: oneshot::Sender<()>,
        /// Why this source ended, shared with its viewers
        end: Arc<OnceLock<Error>>,
    },
    Failed { producer: Producer },
}

struct Inner {
    phase: Phase,
    viewers: HashSet<u64>,
    /// Registry attach calls in flight for this session
    pending_attaches: usize,
    last_error: Option<Error>,
    active_since: Option<Instant>,
    /// Set by registry shutdown; no source is started afterwards
    closing: bool,
}

/// Relay session for a single camera
pub struct CameraSession {
    camera_id: CameraId,
    viewer_buffer: usize,
    inner: Mutex<Inner>,
    /// Serializes source opening so one camera never has two
    start_gate: tokio::sync::Mutex<()>,
    map: Weak<SessionMap>,
    next_viewer_id: AtomicU64,
    next_generation: AtomicU64,
    frames_produced: AtomicU64,
    bytes_produced: AtomicU64,
    /// Counters of the current source only
    source_frames: AtomicU64,
    source_bytes: AtomicU64,
    sources_opened: AtomicU64,
}

impl CameraSession {
    pub(super) fn new(camera_id: CameraId, viewer_buffer: usize, map: Weak<SessionMap>) -> Self {
        Self {
            camera_id,
            viewer_buffer: viewer_buffer.max(1),
            inner: Mutex::new(Inner {
                phase: Phase::Idle { draining: None },
                viewers: HashSet::new(),
                pending_attaches: 0,
                last_error: None,
                active_since: None,
                closing: false,
            }),
            start_gate: tokio::sync::Mutex::new(()),
            map,
            next_viewer_id: AtomicU64::new(1),
            next_generation: AtomicU64::new(1),
            frames_produced: AtomicU64::new(0),
            bytes_produced: AtomicU64::new(0),
            source_frames: AtomicU64::new(0),
            source_bytes: AtomicU64::new(0),
            sources_opened: AtomicU64::new(0),
        }
    }

    /// Camera this session relays
    pub fn camera_id(&self) -> CameraId {
        self.camera_id
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        match self.inner.lock().phase {
            Phase::Idle { .. } => SessionState::Idle,
            Phase::Starting => SessionState::Starting,
            Phase::Active { .. } => SessionState::Active,
            Phase::Failed { .. } => SessionState::Failed,
        }
    }

    /// Number of attached viewers
    pub fn viewer_count(&self) -> usize {
        self.inner.lock().viewers.len()
    }

    /// Most recent connect or stream error
    pub fn last_error(&self) -> Option<Error> {
        self.inner.lock().last_error.clone()
    }

    /// Snapshot of the session counters
    pub fn stats(&self) -> SessionStats {
        let inner = self.inner.lock();
        let state = match inner.phase {
            Phase::Idle { .. } => SessionState::Idle,
            Phase::Starting => SessionState::Starting,
            Phase::Active { .. } => SessionState::Active,
            Phase::Failed { .. } => SessionState::Failed,
        };

        SessionStats {
            camera_id: self.camera_id,
            state,
            viewers: inner.viewers.len(),
            frames_produced: self.frames_produced.load(Ordering::Relaxed),
            bytes_produced: self.bytes_produced.load(Ordering::Relaxed),
            frames_since_open: self.source_frames.load(Ordering::Relaxed),
            bytes_since_open: self.source_bytes.load(Ordering::Relaxed),
            sources_opened: self.sources_opened.load(Ordering::Relaxed),
            active_for: inner.active_since.map(|t| t.elapsed()),
            last_error: inner.last_error.as_ref().map(|e| e.to_string()),
        }
    }

    /// Attach a viewer, opening the frame source if this is the first one
    ///
    /// On `ConnectError` the session is left idle with no viewers. Fails
    /// with `ShuttingDown` once the registry has shut the session down, even
    /// if the source was already being opened.
    pub(super) async fn attach<C: FrameSourceConnector>(
        self: &Arc<Self>,
        connector: &C,
        record: &CameraRecord,
    ) -> Result<ViewerChannel> {
        let _gate = self.start_gate.lock().await;

        let previous = {
            let mut inner = self.inner.lock();

            if inner.closing {
                return Err(Error::ShuttingDown);
            }

            let active = match &inner.phase {
                Phase::Active { tx, end, .. } => Some((tx.subscribe(), Arc::clone(end))),
                _ => None,
            };
            if let Some((rx, end)) = active {
                return Ok(self.add_viewer(&mut inner, rx, end));
            }

            match std::mem::replace(&mut inner.phase, Phase::Starting) {
                Phase::Idle { draining } => draining,
                Phase::Failed { producer } => Some(producer),
                Phase::Starting | Phase::Active { .. } => None,
            }
        };

        let mut starting = StartingGuard {
            session: self,
            previous,
            armed: true,
        };

        // The previous source must be fully closed before opening a new one
        if let Some(previous) = starting.previous.as_mut() {
            let _ = (&mut previous.handle).await;
            starting.previous = None;
        }

        let opened = match record.connection_url() {
            Ok(url) => {
                tracing::debug!(camera = %self.camera_id, url = %redacted(&url), "Opening frame source");
                connector.open(&url).await
            }
            Err(e) => Err(e),
        };

        let started = {
            let mut inner = self.inner.lock();
            starting.armed = false;

            match opened {
                Err(err) => {
                    tracing::warn!(camera = %self.camera_id, error = %err, "Failed to open frame source");
                    inner.phase = Phase::Idle { draining: None };
                    inner.last_error = Some(err.clone().into());
                    return Err(err.into());
                }
                Ok(source) if inner.closing => {
                    inner.phase = Phase::Idle { draining: None };
                    Err(source)
                }
                Ok(source) => Ok(self.start(&mut inner, source)),
            }
        };

        match started {
            Ok(viewer) => Ok(viewer),
            Err(mut source) => {
                tracing::debug!(camera = %self.camera_id, "Shut down while opening, closing new source");
                source.close().await;
                Err(Error::ShuttingDown)
            }
        }
    }

    /// Enter Active with a freshly opened source and attach the first viewer
    fn start<S: FrameSource>(self: &Arc<Self>, inner: &mut Inner, source: S) -> ViewerChannel {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = broadcast::channel(self.viewer_buffer);
        let (stop_tx, stop_rx) = oneshot::channel();
        let end = Arc::new(OnceLock::new());

        self.source_frames.store(0, Ordering::Relaxed);
        self.source_bytes.store(0, Ordering::Relaxed);

        // Spawned under the lock so a source that fails immediately still
        // finds its own Active phase
        let handle = tokio::spawn(Arc::clone(self).produce(source, tx.clone(), stop_rx, generation));

        inner.phase = Phase::Active {
            producer: Producer { generation, handle },
            tx,
            stop: stop_tx,
            end: Arc::clone(&end),
        };
        inner.last_error = None;
        inner.active_since = Some(Instant::now());
        self.sources_opened.fetch_add(1, Ordering::Relaxed);

        tracing::info!(camera = %self.camera_id, generation, "Relay started");

        self.add_viewer(inner, rx, end)
    }

    fn add_viewer(
        self: &Arc<Self>,
        inner: &mut Inner,
        rx: broadcast::Receiver<Frame>,
        end: Arc<OnceLock<Error>>,
    ) -> ViewerChannel {
        let viewer_id = self.next_viewer_id.fetch_add(1, Ordering::Relaxed);
        inner.viewers.insert(viewer_id);

        tracing::debug!(
            camera = %self.camera_id,
            viewer = viewer_id,
            viewers = inner.viewers.len(),
            "Viewer attached"
        );

        ViewerChannel::new(self.camera_id, viewer_id, rx, end, Arc::clone(self))
    }

    /// Detach a viewer; the last one out stops the frame source
    ///
    /// Unknown or already detached viewers are ignored.
    pub(super) fn detach(self: &Arc<Self>, viewer_id: u64) {
        {
            let mut inner = self.inner.lock();

            if !inner.viewers.remove(&viewer_id) {
                return;
            }

            tracing::debug!(
                camera = %self.camera_id,
                viewer = viewer_id,
                viewers = inner.viewers.len(),
                "Viewer detached"
            );

            if !inner.viewers.is_empty() {
                return;
            }

            let phase = std::mem::replace(&mut inner.phase, Phase::Idle { draining: None });
            inner.phase = match phase {
                Phase::Active { producer, stop, .. } => {
                    let _ = stop.send(());
                    inner.active_since = None;
                    tracing::info!(camera = %self.camera_id, "Last viewer left, stopping relay");
                    Phase::Idle {
                        draining: Some(producer),
                    }
                }
                other => other,
            };
        }

        self.release();
    }

    /// End the relay for every viewer and hand back the producer to await
    ///
    /// The session starts no source afterwards: an attach still opening one
    /// closes it and fails.
    pub(super) fn shutdown(&self) -> Option<JoinHandle<()>> {
        let mut inner = self.inner.lock();
        inner.closing = true;
        inner.viewers.clear();
        inner.active_since = None;

        let phase = std::mem::replace(&mut inner.phase, Phase::Idle { draining: None });
        match phase {
            Phase::Active { producer, stop, .. } => {
                let _ = stop.send(());
                Some(producer.handle)
            }
            Phase::Idle {
                draining: Some(producer),
            }
            | Phase::Failed { producer } => Some(producer.handle),
            Phase::Idle { draining: None } => None,
            Phase::Starting => {
                inner.phase = Phase::Starting;
                None
            }
        }
    }

    pub(super) fn begin_attach(&self) {
        self.inner.lock().pending_attaches += 1;
    }

    pub(super) fn end_attach(&self) {
        let mut inner = self.inner.lock();
        inner.pending_attaches = inner.pending_attaches.saturating_sub(1);
    }

    /// Whether the session holds nothing and nobody is about to use it
    pub(super) fn is_reclaimable(&self) -> bool {
        let inner = self.inner.lock();
        let drained = match &inner.phase {
            Phase::Idle { draining: None } => true,
            Phase::Idle {
                draining: Some(producer),
            } => producer.handle.is_finished(),
            _ => false,
        };

        drained && inner.viewers.is_empty() && inner.pending_attaches == 0
    }

    fn release(self: &Arc<Self>) {
        if let Some(map) = self.map.upgrade() {
            map.release_if_idle(self);
        }
    }

    async fn produce<S: FrameSource>(
        self: Arc<Self>,
        mut source: S,
        tx: broadcast::Sender<Frame>,
        mut stop: oneshot::Receiver<()>,
        generation: u64,
    ) {
        let mut sequence = 0u64;

        let ended = loop {
            tokio::select! {
                biased;

                _ = &mut stop => break None,

                result = source.read_frame() => match result {
                    Ok(data) => {
                        sequence += 1;
                        self.frames_produced.fetch_add(1, Ordering::Relaxed);
                        self.bytes_produced.fetch_add(data.len() as u64, Ordering::Relaxed);
                        self.source_frames.fetch_add(1, Ordering::Relaxed);
                        self.source_bytes.fetch_add(data.len() as u64, Ordering::Relaxed);

                        // Err only means no receiver is listening right now
                        let _ = tx.send(Frame::new(sequence, data));
                    }
                    Err(ended) => break Some(ended),
                },
            }
        };

        drop(tx);

        if let Some(ended) = ended {
            self.fail(generation, ended, sequence);
        }

        source.close().await;
        self.finish(generation);
    }

    /// Upstream ended: notify viewers and enter Failed
    fn fail(&self, generation: u64, ended: StreamEnded, frames: u64) {
        let mut inner = self.inner.lock();

        let phase = std::mem::replace(&mut inner.phase, Phase::Idle { draining: None });
        inner.phase = match phase {
            Phase::Active { producer, end, .. } if producer.generation == generation => {
                // Dropping the sender ends every viewer's stream
                let viewers = inner.viewers.len();
                inner.viewers.clear();
                inner.active_since = None;

                tracing::warn!(
                    camera = %self.camera_id,
                    viewers,
                    frames,
                    error = %ended,
                    "Upstream ended, relay failed"
                );

                let error = Error::from(ended);
                let _ = end.set(error.clone());
                inner.last_error = Some(error);
                Phase::Failed { producer }
            }
            other => other,
        };
    }

    /// Source closed: the session may now be reused or reclaimed
    fn finish(self: &Arc<Self>, generation: u64) {
        {
            let mut inner = self.inner.lock();

            let phase = std::mem::replace(&mut inner.phase, Phase::Idle { draining: None });
            inner.phase = match phase {
                Phase::Idle {
                    draining: Some(producer),
                } if producer.generation == generation => Phase::Idle { draining: None },
                Phase::Failed { producer } if producer.generation == generation => {
                    Phase::Idle { draining: None }
                }
                other => other,
            };
        }

        tracing::debug!(camera = %self.camera_id, generation, "Frame source closed");
        self.release();
    }
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("camera_id", &self.camera_id)
            .field("state", &self.state())
            .field("viewers", &self.viewer_count())
            .finish()
    }
}

/// Returns a session stuck in Starting to Idle if attach is cancelled
struct StartingGuard<'a> {
    session: &'a CameraSession,
    /// Producer of the previous source, until it has finished closing
    previous: Option<Producer>,
    armed: bool,
}

impl Drop for StartingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let mut inner = self.session.inner.lock();
        if matches!(inner.phase, Phase::Starting) {
            inner.phase = Phase::Idle {
                draining: self.previous.take(),
            };
        }
    }
}
