//! Interleaved RTP framing (RFC 2326 §10.12)
//!
//! While a source is playing, the upstream TCP stream interleaves binary
//! RTP packets with occasional inline RTSP responses (answers to
//! keepalives). Every RTP packet is prefixed with a 4-byte header:
//!
//! ```text
//! +------+---------+----------+------------------+
//! | '$'  | channel | size(16) | RTP packet(size) |
//! +------+---------+----------+------------------+
//! ```
//!
//! The channels are fixed: 0 = video RTP, 1 = video RTCP, 2 = audio RTP,
//! 3 = audio RTCP. Anything not starting with `$` is an inline response,
//! which is logged and discarded through its `\r\n\r\n` terminator.

use bytes::{Bytes, BytesMut};

use crate::error::{MediaError, Result};

/// Interleave preamble byte `$`
pub const INTERLEAVED_PREAMBLE: u8 = 0x24;

/// Fixed interleaved channel assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Video = 0,
    VideoRtcp = 1,
    Audio = 2,
    AudioRtcp = 3,
}

impl Channel {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Channel::Video),
            1 => Some(Channel::VideoRtcp),
            2 => Some(Channel::Audio),
            3 => Some(Channel::AudioRtcp),
            _ => None,
        }
    }
}

/// Parsed 12-byte RTP header (RFC 3550)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl RtpHeader {
    /// Parse the fixed header from the first 12 bytes of an RTP packet
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(MediaError::ShortRtpPacket(data.len()).into());
        }
        Ok(Self {
            version: (data[0] >> 6) & 0x03,
            padding: (data[0] >> 5) & 0x01 != 0,
            extension: (data[0] >> 4) & 0x01 != 0,
            csrc_count: data[0] & 0x0f,
            marker: (data[1] >> 7) & 0x01 != 0,
            payload_type: data[1] & 0x7f,
            sequence: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
        })
    }
}

/// One extracted interleaved packet
#[derive(Debug)]
pub struct InterleavedPacket {
    /// Raw channel byte from the interleave header
    pub channel: u8,
    /// Parsed RTP header
    pub header: RtpHeader,
    /// RTP payload: everything after the fixed 12-byte header
    pub payload: Bytes,
}

fn find_crlf_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Splits the upstream byte stream into interleaved RTP packets.
///
/// The framer owns a growing buffer; the caller appends raw TCP reads and
/// drains complete packets. Inline RTSP responses (keepalive replies) are
/// fire-and-forget: logged at debug level and skipped.
#[derive(Debug, Default)]
pub struct InterleavedFramer {
    buffer: BytesMut,
}

impl InterleavedFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the upstream socket
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes currently buffered and not yet framed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Extract the next complete packet, or `None` if more bytes are
    /// needed. A packet too small for an RTP header is a protocol error.
    pub fn next_packet(&mut self) -> Result<Option<InterleavedPacket>> {
        loop {
            match self.buffer.first() {
                None => return Ok(None),
                Some(&INTERLEAVED_PREAMBLE) => break,
                Some(_) => {
                    // an inline RTSP response; skip through its terminator
                    match find_crlf_crlf(&self.buffer) {
                        Some(end) => {
                            let inline = self.buffer.split_to(end + 4);
                            tracing::debug!(
                                response = %String::from_utf8_lossy(&inline),
                                "inline rtsp response"
                            );
                        }
                        None => return Ok(None),
                    }
                }
            }
        }

        if self.buffer.len() < 4 {
            return Ok(None);
        }
        let size = u16::from_be_bytes([self.buffer[2], self.buffer[3]]) as usize;
        if self.buffer.len() < size + 4 {
            return Ok(None);
        }
        if size < 12 {
            return Err(MediaError::ShortRtpPacket(size).into());
        }

        let packet = self.buffer.split_to(size + 4).freeze();
        let channel = packet[1];
        let header = RtpHeader::parse(&packet[4..16])?;
        let payload = packet.slice(16..);
        Ok(Some(InterleavedPacket {
            channel,
            header,
            payload,
        }))
    }
}
