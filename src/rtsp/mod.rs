//! RTSP client protocol
//!
//! This module provides:
//! - the sans-IO dialog state machine driving
//!   `OPTIONS → DESCRIBE → SETUP → PLAY` and keepalives
//! - Basic and Digest-MD5 authentication
//! - the interleaved `$`-framer splitting RTP out of the TCP stream

pub mod auth;
pub mod dialog;
pub mod framer;

pub use auth::{Authorization, Challenge};
pub use dialog::{DialogProgress, RtspDialog, SourceState};
pub use framer::{Channel, InterleavedFramer, InterleavedPacket, RtpHeader};
