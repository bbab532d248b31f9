//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

/// Gateway configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP front door binds to
    pub bind_addr: SocketAddr,

    /// Enable TCP_NODELAY on viewer sockets
    pub tcp_nodelay: bool,

    /// Capacity of the per-source broadcast channel; a viewer falling
    /// further behind than this skips ahead to the next key frame
    pub broadcast_capacity: usize,

    /// How long to wait between bind attempts when the port is taken
    pub bind_retry_interval: Duration,

    /// Optional upstream URL to attach at startup and watch
    pub upstream_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5566".parse().unwrap(),
            tcp_nodelay: true,
            broadcast_capacity: 256,
            bind_retry_interval: Duration::from_secs(2),
            upstream_url: None,
        }
    }
}

impl ServerConfig {
    /// Create a config with a custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the bind port, keeping the wildcard address
    pub fn port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }

    /// Set the broadcast channel capacity
    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Attach this upstream at startup
    pub fn upstream(mut self, url: Option<String>) -> Self {
        self.upstream_url = url;
        self
    }
}
