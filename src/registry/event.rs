//! Broadcast types for source → sink routing
//!
//! This module defines the key that identifies an upstream source and the
//! events fanned out to its attached viewers.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::sdp::Sdp;
use crate::url::Url;

/// Unique identifier for an upstream source: its network address.
///
/// The content path is deliberately not part of the key: viewers asking
/// the same server share one upstream session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    /// Upstream host
    pub host: String,
    /// Upstream port
    pub port: u16,
}

impl SourceKey {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn from_url(url: &Url) -> Self {
        Self::new(url.host.clone(), url.port)
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// An event fanned out to every sink of a source
///
/// Cheap to clone: frame payloads are reference-counted `Bytes` and the
/// SDP is shared behind an `Arc`.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// The upstream session has been described; sinks emit their HTTP
    /// response and FLV prologue from this
    Sdp(Arc<Sdp>),
    /// One complete video NAL with its RTP timestamp and the current
    /// parameter sets
    Video {
        frame: Bytes,
        timestamp: u32,
        sps: Bytes,
        pps: Bytes,
    },
    /// One AAC frame (AU headers already stripped) with its RTP timestamp
    Audio { sample: Bytes, timestamp: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        assert_eq!(SourceKey::new("10.0.0.1", 554).to_string(), "10.0.0.1:554");
    }

    #[test]
    fn test_key_ignores_content_path() {
        let a = SourceKey::from_url(&Url::parse("rtsp://10.0.0.1:554/one").unwrap());
        let b = SourceKey::from_url(&Url::parse("rtsp://10.0.0.1:554/two").unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_distinguishes_ports() {
        let a = SourceKey::new("10.0.0.1", 554);
        let b = SourceKey::new("10.0.0.1", 8554);
        assert_ne!(a, b);
    }
}
