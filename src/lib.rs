//! RTSP→FLV remuxing gateway
//!
//! Accepts HTTP GET requests whose path is an RTSP URL, opens a single
//! upstream RTSP/TCP session per unique source address, pulls interleaved
//! RTP (H.264 video, optionally AAC audio) and fans it out to all viewers
//! of that source as an FLV byte stream over the original HTTP
//! connection. The upstream session is torn down when its last viewer
//! disconnects.
//!
//! ```no_run
//! use flv_gateway::{FlvGateway, ServerConfig};
//!
//! # async fn example() -> flv_gateway::Result<()> {
//! let config = ServerConfig::default().port(5566);
//! FlvGateway::new(config).run().await
//! # }
//! ```

pub mod error;
pub mod media;
pub mod registry;
pub mod rtsp;
pub mod sdp;
pub mod server;
pub mod session;
pub mod stats;
pub mod url;

pub use error::{Error, Result};
pub use server::{FlvGateway, ServerConfig};
pub use url::Url;
