//! H.264 RTP depacketization (RFC 6184)
//!
//! The upstream delivers H.264 either as single-NAL packets (one NAL per
//! RTP payload) or as FU-A fragments of one large NAL spread over several
//! packets. The depacketizer reassembles FU-A runs, passes single NALs
//! through, and captures SPS/PPS parameter sets on the way.
//!
//! NAL unit header:
//! ```text
//! +---+-----+---------+
//! | F | NRI |  Type   |
//! |(1)| (2) |   (5)   |
//! +---+-----+---------+
//! ```
//!
//! FU header (second byte of an FU-A payload):
//! ```text
//! +---+---+---+---------+
//! | S | E | R |  Type   |
//! |(1)|(1)|(1)|   (5)   |
//! +---+---+---+---------+
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{MediaError, Result};

/// Mask for the 5-bit NAL unit type
pub const NAL_TYPE_MASK: u8 = 0x1f;

/// NAL unit type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    /// Non-IDR slice
    Slice = 1,
    /// IDR slice (keyframe)
    Idr = 5,
    /// Supplemental enhancement information
    Sei = 6,
    /// Sequence parameter set
    Sps = 7,
    /// Picture parameter set
    Pps = 8,
    /// Access unit delimiter
    Aud = 9,
    /// Aggregation packet (RFC 6184)
    StapA = 24,
    /// Fragmentation unit type A (RFC 6184)
    FuA = 28,
}

impl NaluType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & NAL_TYPE_MASK {
            1 => Some(NaluType::Slice),
            5 => Some(NaluType::Idr),
            6 => Some(NaluType::Sei),
            7 => Some(NaluType::Sps),
            8 => Some(NaluType::Pps),
            9 => Some(NaluType::Aud),
            24 => Some(NaluType::StapA),
            28 => Some(NaluType::FuA),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(self, NaluType::Idr)
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NaluType::Sps | NaluType::Pps)
    }
}

/// Parsed NAL unit header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnitHeader {
    /// Forbidden-zero bit
    pub forbidden: u8,
    /// NAL reference indicator
    pub nri: u8,
    /// 5-bit NAL unit type
    pub nalu_type: u8,
}

impl NalUnitHeader {
    pub fn parse(b: u8) -> Self {
        Self {
            forbidden: b >> 7,
            nri: (b >> 5) & 0x03,
            nalu_type: b & NAL_TYPE_MASK,
        }
    }
}

/// Parsed FU header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuHeader {
    /// Start of a fragmented NAL
    pub start: bool,
    /// End of a fragmented NAL
    pub end: bool,
    /// Reserved bit
    pub reserved: bool,
    /// Type of the fragmented NAL
    pub nalu_type: u8,
}

impl FuHeader {
    pub fn parse(b: u8) -> Self {
        Self {
            start: (b >> 7) & 0x01 != 0,
            end: (b >> 6) & 0x01 != 0,
            reserved: (b >> 5) & 0x01 != 0,
            nalu_type: b & NAL_TYPE_MASK,
        }
    }
}

/// Is this complete NAL an IDR slice?
pub fn is_idr(frame: &[u8]) -> bool {
    frame
        .first()
        .map(|b| b & NAL_TYPE_MASK == NaluType::Idr as u8)
        .unwrap_or(false)
}

/// Reassembles NAL units from RTP payloads on the video channel.
///
/// Single-NAL payloads are emitted as-is. FU-A payloads accumulate into an
/// internal buffer: the start fragment synthesizes the NAL header from the
/// FU indicator's F/NRI bits and the FU header's type, continuation
/// fragments append, and the end fragment emits the whole NAL. SPS and PPS
/// NALs are captured so the fan-out can gate on their presence.
#[derive(Debug, Default)]
pub struct H264Depacketizer {
    frame: BytesMut,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
}

impl H264Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the parameter sets from SDP `sprop-parameter-sets`
    pub fn set_parameter_sets(&mut self, sps: Bytes, pps: Bytes) {
        self.sps = Some(sps);
        self.pps = Some(pps);
    }

    /// Both parameter sets, once both have been seen
    pub fn parameter_sets(&self) -> Option<(Bytes, Bytes)> {
        match (&self.sps, &self.pps) {
            (Some(sps), Some(pps)) => Some((sps.clone(), pps.clone())),
            _ => None,
        }
    }

    /// Feed one RTP payload. Returns a complete NAL when one is ready.
    pub fn push(&mut self, payload: &Bytes) -> Result<Option<Bytes>> {
        let first = match payload.first() {
            Some(b) => *b,
            None => return Ok(None),
        };
        let unit = NalUnitHeader::parse(first);

        if unit.nalu_type == NaluType::FuA as u8 {
            if payload.len() < 2 {
                return Err(MediaError::ShortFragment(payload.len()).into());
            }
            let fu = FuHeader::parse(payload[1]);
            if fu.start {
                self.frame.clear();
                self.frame
                    .put_u8((unit.forbidden << 7) | (unit.nri << 5) | fu.nalu_type);
            }
            self.frame.extend_from_slice(&payload[2..]);
            if fu.end {
                let frame = self.frame.split().freeze();
                self.capture(&frame);
                return Ok(Some(frame));
            }
            Ok(None)
        } else {
            let frame = payload.clone();
            self.capture(&frame);
            Ok(Some(frame))
        }
    }

    fn capture(&mut self, frame: &Bytes) {
        match frame.first().map(|b| b & NAL_TYPE_MASK) {
            Some(t) if t == NaluType::Sps as u8 => self.sps = Some(frame.clone()),
            Some(t) if t == NaluType::Pps as u8 => self.pps = Some(frame.clone()),
            _ => {}
        }
    }
}
