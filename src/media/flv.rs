//! FLV tag generation
//!
//! The gateway writes an FLV byte stream: a 9-byte file header, a zero
//! PreviousTagSize, then tags. Every tag is written as a "body": the tag
//! itself followed by a big-endian u32 equal to the tag's length.
//!
//! FLV Tag Structure:
//! ```text
//! +--------+-------------+-----------+-------------+---------+
//! | Type(1)| DataSize(3) | TS(3+1)   | StreamID(3) | Data(N) |
//! +--------+-------------+-----------+-------------+---------+
//! ```
//!
//! Video Data:
//! ```text
//! +----------+----------+---------------+---------------------+
//! | FrameType| CodecID  | AVCPacketType | CompositionTime(3)  | NALUs...
//! | (4 bits) | (4 bits) | (1 byte)      |                     |
//! +----------+----------+---------------+---------------------+
//! ```
//!
//! Audio Data:
//! ```text
//! +-----------+---------+----------+----------+---------+
//! |SoundFormat|SoundRate|SoundSize |SoundType | AACType | AACData
//! | (4 bits)  | (2 bits)| (1 bit)  | (1 bit)  | (1 byte)|
//! +-----------+---------+----------+----------+---------+
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::aac;

/// FLV tag type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagType {
    Audio = 8,
    Video = 9,
}

/// Video frame type (upper 4 bits of the first data byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Keyframe (for AVC, a seekable frame)
    Key = 1,
    /// Inter frame (for AVC, a non-seekable frame)
    Inter = 2,
}

/// AVC packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcPacketType {
    /// Sequence header (AVCDecoderConfigurationRecord)
    SequenceHeader = 0,
    /// Length-prefixed NAL units
    NalUnit = 1,
}

/// AAC packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacPacketType {
    /// Sequence header (AudioSpecificConfig)
    SequenceHeader = 0,
    /// Raw AAC frame data
    Raw = 1,
}

/// Audio format (upper 4 bits of the audio data prefix)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundFormat {
    LinearPcmPlatform = 0,
    Adpcm = 1,
    Mp3 = 2,
    LinearPcmLe = 3,
    Nellymoser16kMono = 4,
    Nellymoser8kMono = 5,
    Nellymoser = 6,
    G711ALaw = 7,
    G711MuLaw = 8,
    Aac = 10,
}

/// Audio sample rate (2 bits of the audio data prefix)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundRate {
    Hz5512 = 0,
    Hz11025 = 1,
    Hz22050 = 2,
    Hz44100 = 3,
}

/// Audio sample size (1 bit of the audio data prefix)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundSize {
    Bits8 = 0,
    Bits16 = 1,
}

/// Audio channel layout (1 bit of the audio data prefix)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundType {
    Mono = 0,
    Stereo = 1,
}

/// AVC codec id in the lower 4 bits of the video data prefix
const VIDEO_CODEC_AVC: u8 = 7;

/// The 9-byte FLV file header; video is always flagged, audio on demand
#[derive(Debug, Clone, Copy)]
pub struct FlvHeader {
    has_audio: bool,
}

impl FlvHeader {
    pub fn new(has_audio: bool) -> Self {
        Self { has_audio }
    }

    pub fn to_bytes(&self) -> [u8; 9] {
        let mut data = [0x46, 0x4c, 0x56, 0x01, 0x01, 0x00, 0x00, 0x00, 0x09];
        data[4] |= (self.has_audio as u8) << 2;
        data
    }
}

/// The packed audio data prefix byte
#[derive(Debug, Clone, Copy)]
pub struct AudioData {
    format: SoundFormat,
    rate: SoundRate,
    size: SoundSize,
    channels: SoundType,
}

impl AudioData {
    /// The fixed prefix the gateway emits: AAC, 44 kHz, 16-bit, stereo
    pub fn aac() -> Self {
        Self {
            format: SoundFormat::Aac,
            rate: SoundRate::Hz44100,
            size: SoundSize::Bits16,
            channels: SoundType::Stereo,
        }
    }

    pub fn to_byte(&self) -> u8 {
        ((self.format as u8 & 0x0f) << 4)
            | ((self.rate as u8 & 0x03) << 2)
            | ((self.size as u8 & 0x01) << 1)
            | (self.channels as u8 & 0x01)
    }
}

fn put_uint24(buf: &mut BytesMut, value: u32) {
    buf.put_u8(((value >> 16) & 0xff) as u8);
    buf.put_u8(((value >> 8) & 0xff) as u8);
    buf.put_u8((value & 0xff) as u8);
}

/// A single FLV tag under construction
#[derive(Debug)]
pub struct FlvTag {
    data: BytesMut,
}

impl FlvTag {
    /// 11-byte tag header: type, 24-bit data size, 24+8-bit timestamp,
    /// zero stream id. The millisecond timestamp is truncated to 32 bits.
    fn with_header(tag_type: TagType, data_len: usize, timestamp: u64) -> Self {
        let mut data = BytesMut::with_capacity(11 + data_len + 4);
        data.put_u8(tag_type as u8);
        put_uint24(&mut data, data_len as u32);
        put_uint24(&mut data, (timestamp & 0xff_ffff) as u32);
        data.put_u8(((timestamp >> 24) & 0xff) as u8);
        put_uint24(&mut data, 0);
        FlvTag { data }
    }

    fn video(frame_type: FrameType, data_len: usize, timestamp: u64) -> Self {
        let mut tag = Self::with_header(TagType::Video, data_len, timestamp);
        tag.data.put_u8(((frame_type as u8) << 4) | VIDEO_CODEC_AVC);
        tag
    }

    /// AVC sequence header tag at timestamp 0, carrying the
    /// AVCDecoderConfigurationRecord built from one SPS and one PPS.
    pub fn avc_sequence_header(sps: &[u8], pps: &[u8]) -> Self {
        let mut record = BytesMut::with_capacity(11 + sps.len() + pps.len());
        record.put_u8(0x01);
        // profile, compatibility and level are echoed from the SPS
        record.extend_from_slice(sps.get(1..4).unwrap_or(&[0, 0, 0]));
        record.put_u8(0xff);
        record.put_u8(0xe1);
        record.put_u16(sps.len() as u16);
        record.extend_from_slice(sps);
        record.put_u8(0x01);
        record.put_u16(pps.len() as u16);
        record.extend_from_slice(pps);

        let mut tag = Self::video(FrameType::Key, record.len() + 5, 0);
        tag.data.put_u8(AvcPacketType::SequenceHeader as u8);
        put_uint24(&mut tag.data, 0);
        tag.data.extend_from_slice(&record);
        tag
    }

    /// Key frame tag: SPS, PPS and the IDR NAL, each with a u32 length prefix
    pub fn avc_key_frame(sps: &[u8], pps: &[u8], frame: &[u8], timestamp: u64) -> Self {
        let nalus_len = 12 + sps.len() + pps.len() + frame.len();
        let mut tag = Self::video(FrameType::Key, nalus_len + 5, timestamp);
        tag.data.put_u8(AvcPacketType::NalUnit as u8);
        put_uint24(&mut tag.data, 0);
        tag.data.put_u32(sps.len() as u32);
        tag.data.extend_from_slice(sps);
        tag.data.put_u32(pps.len() as u32);
        tag.data.extend_from_slice(pps);
        tag.data.put_u32(frame.len() as u32);
        tag.data.extend_from_slice(frame);
        tag
    }

    /// Inter frame tag: the NAL alone with its u32 length prefix
    pub fn avc_inter_frame(frame: &[u8], timestamp: u64) -> Self {
        let mut tag = Self::video(FrameType::Inter, frame.len() + 9, timestamp);
        tag.data.put_u8(AvcPacketType::NalUnit as u8);
        put_uint24(&mut tag.data, 0);
        tag.data.put_u32(frame.len() as u32);
        tag.data.extend_from_slice(frame);
        tag
    }

    fn audio(sample: &[u8], timestamp: u64, packet_type: AacPacketType) -> Self {
        let mut tag = Self::with_header(TagType::Audio, sample.len() + 2, timestamp);
        tag.data.put_u8(AudioData::aac().to_byte());
        tag.data.put_u8(packet_type as u8);
        tag.data.extend_from_slice(sample);
        tag
    }

    /// AAC sequence header tag at timestamp 0 carrying the
    /// AudioSpecificConfig for the given rate and channel count
    pub fn aac_sequence_header(clock_rate: u32, channels: u8) -> Self {
        let config = aac::audio_specific_config(clock_rate, channels);
        Self::audio(&config, 0, AacPacketType::SequenceHeader)
    }

    /// Raw AAC frame tag
    pub fn aac_raw(sample: &[u8], timestamp: u64) -> Self {
        Self::audio(sample, timestamp, AacPacketType::Raw)
    }

    /// Total tag size: 11-byte header plus data
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append the u32 previous-tag-size trailer and yield the wire bytes.
    /// The trailer equals the tag length, header included, trailer excluded.
    pub fn into_body(self) -> Bytes {
        let len = self.data.len() as u32;
        let mut data = self.data;
        data.put_u32(len);
        data.freeze()
    }
}
