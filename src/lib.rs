//! Network camera relay
//!
//! Serves live MJPEG video and JPEG snapshots from RTSP cameras. However many
//! viewers watch a camera, it gets exactly one upstream connection, opened on
//! the first attach and closed as soon as the last viewer leaves.
//!
//! # Example
//!
//! ```no_run
//! use camera_relay::camera::{CameraId, CameraRecord, MemoryDirectory};
//! use camera_relay::server::{RelayServer, ServerConfig};
//! use camera_relay::source::{FfmpegConfig, FfmpegConnector};
//!
//! #[tokio::main]
//! async fn main() -> camera_relay::Result<()> {
//!     let directory = MemoryDirectory::from_records([
//!         CameraRecord::new(CameraId::new(1), "192.168.1.20", 554, "stream1")
//!             .with_credentials("admin", "secret"),
//!     ]);
//!     let connector = FfmpegConnector::new(FfmpegConfig::default());
//!
//!     let server = RelayServer::new(ServerConfig::default(), directory, connector);
//!     server.run().await
//! }
//! ```

pub mod camera;
pub mod config;
pub mod error;
pub mod registry;
pub mod server;
pub mod snapshot;
pub mod source;
pub mod stats;

pub use camera::{CameraDirectory, CameraId, CameraRecord, MemoryDirectory};
pub use error::{ConnectError, Error, Result, StreamEnded};
pub use registry::{RegistryConfig, RelayRegistry, ViewerChannel};
pub use server::{RelayServer, ServerConfig};
pub use source::{FrameSource, FrameSourceConnector};
