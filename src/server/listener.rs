//! HTTP server listener
//!
//! Binds the listener, serves the routes and tears the relay registry down
//! when the server stops.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::camera::CameraDirectory;
use crate::error::Result;
use crate::registry::{RegistryConfig, RelayRegistry};
use crate::server::config::ServerConfig;
use crate::server::routes::{router, AppState};
use crate::source::FrameSourceConnector;

/// Camera relay HTTP server
pub struct RelayServer<D, C> {
    config: ServerConfig,
    registry: Arc<RelayRegistry<D, C>>,
}

impl<D: CameraDirectory, C: FrameSourceConnector> RelayServer<D, C> {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig, directory: D, connector: C) -> Self {
        Self::with_registry_config(config, directory, connector, RegistryConfig::default())
    }

    /// Create a new server with custom registry configuration
    pub fn with_registry_config(
        config: ServerConfig,
        directory: D,
        connector: C,
        registry_config: RegistryConfig,
    ) -> Self {
        Self {
            config,
            registry: Arc::new(RelayRegistry::with_config(
                Arc::new(directory),
                Arc::new(connector),
                registry_config,
            )),
        }
    }

    /// Get a reference to the relay registry
    pub fn registry(&self) -> &Arc<RelayRegistry<D, C>> {
        &self.registry
    }

    /// Run the server
    ///
    /// This method blocks until the server fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    ///
    /// When `shutdown` completes every relay is ended first, so open video
    /// feeds finish and the server can drain.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Camera relay listening");

        // Spawn cleanup task for the relay registry
        let cleanup_handle = self.registry.spawn_cleanup_task();

        let app = router(AppState::new(Arc::clone(&self.registry), &self.config));
        let registry = Arc::clone(&self.registry);
        let timeout = self.config.shutdown_timeout;

        let (drained_tx, drained_rx) = tokio::sync::oneshot::channel::<()>();
        let graceful = async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
            registry.shutdown().await;
            let _ = drained_tx.send(());
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(graceful);

        let result = tokio::select! {
            result = server.into_future() => result.map_err(Into::into),
            _ = async {
                let _ = drained_rx.await;
                tokio::time::sleep(timeout).await;
            } => {
                tracing::warn!(timeout = ?timeout, "Connections still open after shutdown timeout");
                Ok(())
            }
        };

        // Stop cleanup task on shutdown
        cleanup_handle.abort();

        // Also ends relays when the server stopped on an error
        self.registry.shutdown().await;

        result
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
