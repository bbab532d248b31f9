//! Viewer-facing server
//!
//! The front door accepts plain HTTP GETs whose path is an RTSP URL and
//! answers with an FLV stream remuxed from that upstream.

pub mod config;
pub mod listener;

pub use config::ServerConfig;
pub use listener::FlvGateway;
