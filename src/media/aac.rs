//! AAC audio helpers
//!
//! Two concerns live here: building the 2- or 5-byte AudioSpecificConfig
//! carried by the FLV AAC sequence header, and stripping the RFC 3640 AU
//! header section from MPEG4-GENERIC RTP payloads before the raw frames go
//! into FLV tags.
//!
//! AudioSpecificConfig bit layout (implicit frequency):
//! ```text
//! +---------------+------------+-------------+------+
//! | objectType(5) | freqIdx(4) | channels(4) | 0(3) |
//! +---------------+------------+-------------+------+
//! ```
//! With an explicit frequency (index 15) the 24-bit rate is spliced in
//! between the index and the channel configuration.

use bytes::Bytes;

use crate::error::{MediaError, Result};

/// AAC LC, the only object type the gateway emits
pub const AAC_OBJECT_TYPE_LC: u8 = 2;

/// Standard sampling frequencies by index; index 15 means explicit
const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Index of a sampling rate in the standard table, 15 when not listed
pub fn frequency_index(clock_rate: u32) -> u8 {
    SAMPLING_FREQUENCIES
        .iter()
        .position(|&f| f == clock_rate)
        .map(|i| i as u8)
        .unwrap_or(15)
}

/// Build the AudioSpecificConfig for AAC LC at the given rate and channel
/// count: 2 bytes for a tabled rate, 5 bytes for an explicit one.
pub fn audio_specific_config(clock_rate: u32, channels: u8) -> Bytes {
    let idx = frequency_index(clock_rate);
    if idx == 15 {
        // objectType(5) | idx(4) | rate(24) | channels(4) | padding(3)
        let packed: u64 = ((AAC_OBJECT_TYPE_LC as u64 & 0x1f) << 35)
            | ((idx as u64 & 0x0f) << 31)
            | ((clock_rate as u64 & 0xff_ffff) << 7)
            | ((channels as u64 & 0x0f) << 3);
        Bytes::copy_from_slice(&packed.to_be_bytes()[3..8])
    } else {
        // objectType(5) | idx(4) | channels(4) | padding(3)
        let packed: u16 = ((AAC_OBJECT_TYPE_LC as u16 & 0x1f) << 11)
            | ((idx as u16 & 0x0f) << 7)
            | ((channels as u16 & 0x0f) << 3);
        Bytes::copy_from_slice(&packed.to_be_bytes())
    }
}

/// Strip the AU header section from an MPEG4-GENERIC RTP payload.
///
/// The payload starts with a 16-bit AU-headers-length field counting bits,
/// followed by that many bits of AU headers (rounded up to a whole byte),
/// followed by the raw AAC frames.
pub fn strip_au_headers(payload: &Bytes) -> Result<Bytes> {
    if payload.len() < 2 {
        return Err(MediaError::ShortAuHeader(payload.len()).into());
    }
    let header_bits = u16::from_be_bytes([payload[0], payload[1]]) as usize;
    let offset = 2 + header_bits.div_ceil(8);
    if payload.len() < offset {
        return Err(MediaError::ShortAuHeader(payload.len()).into());
    }
    Ok(payload.slice(offset..))
}
