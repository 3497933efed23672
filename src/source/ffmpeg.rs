//! ffmpeg-backed frame source
//!
//! Runs one `ffmpeg` process per upstream connection. ffmpeg pulls the remote
//! stream, decodes it and re-encodes every frame as a JPEG on stdout, where
//! [`JpegReader`] splits the images apart.
//!
//! ```text
//! rtsp://cam:554/live ──► ffmpeg -i <url> -f image2pipe -c:v mjpeg pipe:1
//!                                    │ stdout             │ stderr
//!                                    ▼                    ▼
//!                              JpegReader            last error line
//! ```

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use url::Url;

use crate::camera::redacted;
use crate::error::{ConnectError, StreamEnded};

use super::jpeg::{JpegReader, DEFAULT_MAX_FRAME_SIZE};
use super::{FrameSource, FrameSourceConnector};

/// ffmpeg adapter configuration
#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    /// ffmpeg executable
    pub program: String,

    /// RTSP lower transport ("tcp" or "udp"), only applied to rtsp:// URLs
    pub rtsp_transport: Option<String>,

    /// JPEG quality scale passed to `-q:v` (2 = best, 31 = worst)
    pub quality: u8,

    /// Output frame rate cap (None = source rate)
    pub max_fps: Option<u32>,

    /// Give up if no first frame arrives within this time (None = wait forever)
    pub open_timeout: Option<Duration>,

    /// Largest accepted JPEG image
    pub max_frame_size: usize,

    /// Extra arguments inserted before `-i`
    pub input_args: Vec<String>,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".into(),
            rtsp_transport: Some("tcp".into()),
            quality: 5,
            max_fps: None,
            open_timeout: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            input_args: Vec::new(),
        }
    }
}

impl FfmpegConfig {
    /// Set the ffmpeg executable
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the RTSP transport
    pub fn rtsp_transport(mut self, transport: Option<String>) -> Self {
        self.rtsp_transport = transport;
        self
    }

    /// Set JPEG quality (clamped to 2..=31)
    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(2, 31);
        self
    }

    /// Cap the output frame rate
    pub fn max_fps(mut self, fps: u32) -> Self {
        self.max_fps = (fps > 0).then_some(fps);
        self
    }

    /// Set the open timeout
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = Some(timeout);
        self
    }

    /// Set the largest accepted frame
    pub fn max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = bytes;
        self
    }

    /// Set extra input arguments
    pub fn input_args(mut self, args: Vec<String>) -> Self {
        self.input_args = args;
        self
    }

    /// Build the ffmpeg argument list for `url`
    pub fn args(&self, url: &Url) -> Vec<String> {
        let mut args: Vec<String> = ["-nostdin", "-hide_banner", "-loglevel", "error"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        if url.scheme() == "rtsp" {
            if let Some(ref transport) = self.rtsp_transport {
                args.push("-rtsp_transport".into());
                args.push(transport.clone());
            }
        }

        args.extend(self.input_args.iter().cloned());
        args.push("-i".into());
        args.push(url.as_str().into());
        args.push("-an".into());

        if let Some(fps) = self.max_fps {
            args.push("-r".into());
            args.push(fps.to_string());
        }

        args.extend(
            ["-f", "image2pipe", "-c:v", "mjpeg", "-q:v"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.push(self.quality.to_string());
        args.push("pipe:1".into());
        args
    }
}

/// Opens [`FfmpegSource`]s
#[derive(Debug, Clone, Default)]
pub struct FfmpegConnector {
    config: FfmpegConfig,
}

impl FfmpegConnector {
    /// Create a connector
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &FfmpegConfig {
        &self.config
    }
}

impl FrameSourceConnector for FfmpegConnector {
    type Source = FfmpegSource;

    async fn open(&self, url: &Url) -> Result<FfmpegSource, ConnectError> {
        let open = FfmpegSource::spawn(&self.config, url);

        // On timeout the child is dropped and killed
        match self.config.open_timeout {
            Some(limit) => tokio::time::timeout(limit, open)
                .await
                .map_err(|_| ConnectError::Timeout(limit))?,
            None => open.await,
        }
    }
}

/// One ffmpeg process pulling one upstream stream
#[derive(Debug)]
pub struct FfmpegSource {
    child: Option<Child>,
    frames: JpegReader<ChildStdout>,
    /// First frame, read during open to confirm the stream works
    pending: Option<Bytes>,
    stderr_task: Option<JoinHandle<Option<String>>>,
    url: String,
}

impl FfmpegSource {
    async fn spawn(config: &FfmpegConfig, url: &Url) -> Result<Self, ConnectError> {
        let shown_url = redacted(url);

        let mut child = Command::new(&config.program)
            .args(config.args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConnectError::Spawn {
                program: config.program.clone(),
                source: Arc::new(e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| ConnectError::Handshake {
            url: shown_url.clone(),
            reason: "decoder stdout unavailable".into(),
        })?;
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(last_stderr_line(stderr, shown_url.clone())));

        tracing::debug!(url = %shown_url, pid = ?child.id(), "ffmpeg started");

        let mut source = Self {
            child: Some(child),
            frames: JpegReader::with_max_frame_size(stdout, config.max_frame_size),
            pending: None,
            stderr_task,
            url: shown_url,
        };

        match source.frames.next_frame().await {
            Ok(first) => {
                source.pending = Some(first);
                Ok(source)
            }
            Err(err) => {
                source.close().await;
                let reason = match source.stderr_task.take() {
                    Some(task) => task.await.ok().flatten(),
                    None => None,
                };

                Err(ConnectError::Handshake {
                    url: source.url.clone(),
                    reason: reason.unwrap_or_else(|| err.to_string()),
                })
            }
        }
    }
}

impl FrameSource for FfmpegSource {
    async fn read_frame(&mut self) -> Result<Bytes, StreamEnded> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }

        if self.child.is_none() {
            return Err(StreamEnded::Closed);
        }

        self.frames.next_frame().await
    }

    async fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                tracing::debug!(url = %self.url, error = %e, "ffmpeg already exited");
            }
            tracing::debug!(url = %self.url, "ffmpeg stopped");
        }
        self.pending = None;
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

/// Drain stderr, logging each line and returning the last one
async fn last_stderr_line(stderr: ChildStderr, url: String) -> Option<String> {
    let mut lines = BufReader::new(stderr).lines();
    let mut last = None;

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        tracing::debug!(url = %url, "ffmpeg: {}", line);
        last = Some(line);
    }

    last
}
