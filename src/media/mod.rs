//! Media handling for the gateway
//!
//! This module provides:
//! - FLV header/tag generation
//! - H.264 RTP depacketization (single NAL and FU-A)
//! - AAC AudioSpecificConfig building and AU header stripping
//! - RTP tick to millisecond timestamp normalization

pub mod aac;
pub mod flv;
pub mod h264;
pub mod timestamp;

pub use flv::{FlvHeader, FlvTag, FrameType, TagType};
pub use h264::{FuHeader, H264Depacketizer, NalUnitHeader, NaluType};
pub use timestamp::TimestampNormalizer;
