//! HTTP front door
//!
//! Binds the viewer-facing TCP port, accepts connections and spawns a
//! sink session per viewer. A taken port is retried on a fixed interval
//! rather than treated as fatal.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::error::Result;
use crate::registry::{SourceEvent, SourceRegistry};
use crate::server::config::ServerConfig;
use crate::session::SinkSession;
use crate::url::Url;

/// The RTSP→FLV gateway server
pub struct FlvGateway {
    config: ServerConfig,
    registry: Arc<SourceRegistry>,
}

impl FlvGateway {
    /// Create a gateway with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(SourceRegistry::new(config.broadcast_capacity));
        Self { config, registry }
    }

    /// The shared source registry
    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Run the gateway.
    ///
    /// This method blocks until the accept loop fails.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await;
        self.preattach().await?;
        self.accept_loop(&listener).await
    }

    /// Run the gateway until `shutdown` completes
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = self.bind().await;
        self.preattach().await?;

        tokio::select! {
            _ = shutdown => {
                tracing::info!("shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    /// Bind the front-door port, retrying until it succeeds
    async fn bind(&self) -> TcpListener {
        loop {
            match TcpListener::bind(self.config.bind_addr).await {
                Ok(listener) => {
                    tracing::info!(addr = %self.config.bind_addr, "start listening");
                    return listener;
                }
                Err(e) => {
                    tracing::error!(addr = %self.config.bind_addr, error = %e, "bind failed, retrying");
                    tokio::time::sleep(self.config.bind_retry_interval).await;
                }
            }
        }
    }

    /// Attach the configured upstream, if any, and keep a permanent
    /// observer on it that logs the video timeline
    async fn preattach(&self) -> Result<()> {
        let Some(url) = &self.config.upstream_url else {
            return Ok(());
        };
        let url = Url::parse(url)?;
        let mut attachment = self.registry.attach(&url).await;
        tracing::info!(url = %url, "upstream pre-attached");

        tokio::spawn(async move {
            let mut previous: Option<u32> = None;
            loop {
                match attachment.events.recv().await {
                    Ok(SourceEvent::Video { frame, timestamp, .. }) => {
                        let delta = previous
                            .map(|p| timestamp.wrapping_sub(p))
                            .unwrap_or(0);
                        previous = Some(timestamp);
                        tracing::debug!(
                            nal = format_args!("{:#04x}", frame.first().copied().unwrap_or(0)),
                            rtp_ts = timestamp,
                            delta_ticks = delta,
                            "timeline"
                        );
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        tracing::warn!("pre-attached upstream closed");
                        return;
                    }
                }
            }
        });
        Ok(())
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: std::net::SocketAddr) {
        tracing::debug!(peer = %peer_addr, "new viewer connection");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::warn!(peer = %peer_addr, error = %e, "failed to set nodelay");
            }
        }

        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            let session = SinkSession::new(socket, peer_addr, registry);
            if let Err(e) = session.run().await {
                tracing::debug!(peer = %peer_addr, error = %e, "viewer session ended with error");
            }
        });
    }
}
