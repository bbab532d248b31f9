//! Error types for the gateway
//!
//! Variants map to specific failure modes across the stack:
//!
//! - **Transport**: [`Io`](Error::Io), [`EndOfStream`](Error::EndOfStream) —
//!   socket failures and zero-length reads.
//! - **RTSP dialog**: [`RtspError`] — URL, SDP, status and authentication
//!   failures while talking to the upstream server.
//! - **Media**: [`MediaError`] — malformed RTP/H.264/AAC payloads.

use std::fmt;

/// Convenience alias for `Result<T, Error>`
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// OS-level socket error
    Io(std::io::Error),
    /// Zero-length read: the peer closed its end of the connection
    EndOfStream,
    /// RTSP dialog failure
    Rtsp(RtspError),
    /// Media-layer parse failure
    Media(MediaError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::EndOfStream => write!(f, "end of stream"),
            Error::Rtsp(e) => write!(f, "{}", e),
            Error::Media(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Rtsp(e) => Some(e),
            Error::Media(e) => Some(e),
            Error::EndOfStream => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<RtspError> for Error {
    fn from(e: RtspError) -> Self {
        Error::Rtsp(e)
    }
}

impl From<MediaError> for Error {
    fn from(e: MediaError) -> Self {
        Error::Media(e)
    }
}

/// Error type for the RTSP dialog and the HTTP front door
#[derive(Debug, Clone)]
pub enum RtspError {
    /// URL could not be parsed, or its scheme is not `rtsp`
    InvalidUrl(String),
    /// DESCRIBE body lacks a video media with a `control` attribute
    InvalidSdp(String),
    /// Upstream answered with a status other than 200 or 401
    SourceNotFound { url: String, status: u16 },
    /// Upstream kept answering 401 after repeated authenticated retries
    CredentialsNotAccepted(String),
    /// Bytes at `Playing` that are neither `$`-framed RTP nor a response
    ProtocolViolation(&'static str),
}

impl fmt::Display for RtspError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtspError::InvalidUrl(url) => write!(f, "invalid url {}", url),
            RtspError::InvalidSdp(reason) => write!(f, "invalid SDP: {}", reason),
            RtspError::SourceNotFound { url, status } => {
                write!(f, "source {} not found (status {})", url, status)
            }
            RtspError::CredentialsNotAccepted(user) => {
                write!(f, "credentials for {:?} not accepted", user)
            }
            RtspError::ProtocolViolation(what) => write!(f, "protocol violation: {}", what),
        }
    }
}

impl std::error::Error for RtspError {}

/// Error type for media payload parsing
#[derive(Debug, Clone)]
pub enum MediaError {
    /// Interleaved packet too short to carry a 12-byte RTP header
    ShortRtpPacket(usize),
    /// FU-A payload without the two fragmentation header bytes
    ShortFragment(usize),
    /// AAC payload shorter than its AU header section claims
    ShortAuHeader(usize),
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::ShortRtpPacket(len) => {
                write!(f, "interleaved packet of {} bytes is too short for RTP", len)
            }
            MediaError::ShortFragment(len) => {
                write!(f, "FU-A payload of {} bytes is too short", len)
            }
            MediaError::ShortAuHeader(len) => {
                write!(f, "AAC payload of {} bytes is too short for its AU headers", len)
            }
        }
    }
}

impl std::error::Error for MediaError {}
