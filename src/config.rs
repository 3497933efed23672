//! Configuration file
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:5000"
//! max_streams = 64
//!
//! [relay]
//! cleanup_interval_secs = 30
//!
//! [ffmpeg]
//! rtsp_transport = "tcp"
//! quality = 5
//!
//! [[cameras]]
//! id = 1
//! host = "192.168.1.20"
//! path = "stream1"
//! username = "admin"
//! password = "secret"
//! location = "Front door"
//! ```
//!
//! Every section is optional; missing values fall back to the defaults of
//! [`ServerConfig`], [`RegistryConfig`] and [`FfmpegConfig`].

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::camera::{CameraId, CameraRecord, MemoryDirectory};
use crate::error::{Error, Result};
use crate::registry::RegistryConfig;
use crate::server::ServerConfig;
use crate::source::FfmpegConfig;

/// Default RTSP port for camera entries that leave it out
pub const DEFAULT_CAMERA_PORT: u16 = 554;

/// Parsed configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: ServerSection,
    pub relay: RelaySection,
    pub ffmpeg: FfmpegSection,
    pub cameras: Vec<CameraEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub bind: Option<SocketAddr>,
    pub max_streams: Option<usize>,
    pub shutdown_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelaySection {
    pub viewer_buffer: Option<usize>,
    pub cleanup_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FfmpegSection {
    pub program: Option<String>,
    /// `"auto"` lets ffmpeg pick the transport
    pub rtsp_transport: Option<String>,
    pub quality: Option<u8>,
    pub max_fps: Option<u32>,
    pub open_timeout_secs: Option<u64>,
    pub max_frame_size: Option<usize>,
    pub input_args: Vec<String>,
}

/// One `[[cameras]]` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CameraEntry {
    pub id: u64,
    #[serde(alias = "ip")]
    pub host: String,
    #[serde(default = "default_camera_port")]
    pub port: u16,
    #[serde(default)]
    pub path: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub location: Option<String>,
}

fn default_camera_port() -> u16 {
    DEFAULT_CAMERA_PORT
}

impl CameraEntry {
    fn to_record(&self) -> CameraRecord {
        let mut record = CameraRecord::new(CameraId::new(self.id), self.host.trim(), self.port, self.path.trim());

        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            record = record.with_credentials(username.as_str(), password.as_str());
        }
        if let Some(location) = &self.location {
            record = record.with_location(location.as_str());
        }

        record
    }
}

impl FileConfig {
    /// Parse configuration from TOML text
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read and parse a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(&text)
    }

    /// HTTP server settings
    pub fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::default();
        let section = &self.server;

        if let Some(addr) = section.bind {
            config = config.bind(addr);
        }
        if let Some(max) = section.max_streams {
            config = config.max_streams(max);
        }
        if let Some(secs) = section.shutdown_timeout_secs {
            config = config.shutdown_timeout(Duration::from_secs(secs));
        }

        config
    }

    /// Relay registry settings
    pub fn registry_config(&self) -> RegistryConfig {
        let mut config = RegistryConfig::default();
        let section = &self.relay;

        if let Some(frames) = section.viewer_buffer {
            config = config.viewer_buffer(frames);
        }
        if let Some(secs) = section.cleanup_interval_secs {
            config = config.cleanup_interval(Duration::from_secs(secs.max(1)));
        }

        config
    }

    /// ffmpeg frame source settings
    pub fn ffmpeg_config(&self) -> FfmpegConfig {
        let mut config = FfmpegConfig::default();
        let section = &self.ffmpeg;

        if let Some(program) = &section.program {
            config = config.program(program.as_str());
        }
        if let Some(transport) = &section.rtsp_transport {
            let transport = (transport != "auto").then(|| transport.clone());
            config = config.rtsp_transport(transport);
        }
        if let Some(quality) = section.quality {
            config = config.quality(quality);
        }
        if let Some(fps) = section.max_fps {
            config = config.max_fps(fps);
        }
        if let Some(secs) = section.open_timeout_secs {
            config = config.open_timeout(Duration::from_secs(secs));
        }
        if let Some(bytes) = section.max_frame_size {
            config = config.max_frame_size(bytes);
        }
        if !section.input_args.is_empty() {
            config = config.input_args(section.input_args.clone());
        }

        config
    }

    /// Build the camera directory from the `[[cameras]]` entries
    pub fn directory(&self) -> Result<MemoryDirectory> {
        let mut seen = HashSet::new();

        for entry in &self.cameras {
            if !seen.insert(entry.id) {
                return Err(Error::Config(format!("duplicate camera id {}", entry.id)));
            }
            if entry.host.trim().is_empty() {
                return Err(Error::Config(format!("camera {} has no host", entry.id)));
            }
        }

        Ok(MemoryDirectory::from_records(self.cameras.iter().map(CameraEntry::to_record)))
    }
}
