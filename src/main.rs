use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use camera_relay::camera::CameraDirectory;
use camera_relay::config::FileConfig;
use camera_relay::snapshot::{probe, snapshot};
use camera_relay::source::FfmpegConnector;
use camera_relay::{CameraId, RelayServer};

#[derive(Parser, Debug)]
#[command(name = "camera-relay")]
#[command(about = "Relay live MJPEG video and snapshots from network cameras", long_about = None)]
struct Args {
    /// Configuration file
    #[arg(long, short, env = "CAMERA_RELAY_CONFIG", default_value = "relay.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP endpoints (default)
    Serve {
        /// Listen address, overrides the config file
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Listen port, overrides the config file
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },
    /// List configured cameras
    List,
    /// Check that every configured camera delivers frames
    Probe,
    /// Save one JPEG frame from a camera
    Snapshot {
        /// Camera id
        camera: u64,

        /// Output file
        #[arg(long, short, default_value = "snapshot.jpg")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("camera_relay=info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();

    let file = FileConfig::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    let directory = file.directory().context("invalid camera list")?;
    let connector = FfmpegConnector::new(file.ffmpeg_config());

    match args.command.unwrap_or(Command::Serve { bind: None, port: None }) {
        Command::Serve { bind, port } => {
            let mut config = file.server_config();
            if let Some(addr) = bind {
                config = config.bind(addr);
            }
            if let Some(port) = port {
                config = config.port(port);
            }

            tracing::info!(cameras = directory.len(), "Starting camera relay");

            let server = RelayServer::with_registry_config(config, directory, connector, file.registry_config());
            server
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!(error = %e, "Failed to listen for shutdown signal");
                        std::future::pending::<()>().await;
                    }
                })
                .await?;
        }
        Command::List => {
            for camera in directory.list_cameras().await {
                println!(
                    "{}\t{}:{}/{}\t{}",
                    camera.id,
                    camera.host,
                    camera.port,
                    camera.path.trim_start_matches('/'),
                    camera.location.as_deref().unwrap_or("-"),
                );
            }
        }
        Command::Probe => {
            let mut failed = 0;
            for camera in directory.list_cameras().await {
                match probe(&connector, &camera).await {
                    Ok(()) => println!("{}\tok", camera.id),
                    Err(e) => {
                        failed += 1;
                        println!("{}\tfailed: {e}", camera.id);
                    }
                }
            }
            anyhow::ensure!(failed == 0, "{failed} camera(s) unreachable");
        }
        Command::Snapshot { camera, output } => {
            let image = snapshot(&directory, &connector, CameraId::new(camera)).await?;
            tokio::fs::write(&output, &image)
                .await
                .with_context(|| format!("writing {}", output.display()))?;

            println!("Saved {} bytes to {}", image.len(), output.display());
        }
    }

    Ok(())
}
