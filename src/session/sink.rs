//! Downstream viewer session
//!
//! One task per HTTP viewer: parses the `GET /<rtsp-url>` request line,
//! attaches to the shared upstream source through the registry, then
//! turns broadcast events into FLV bytes on the socket.
//!
//! The FLV encoding itself lives in [`FlvSink`], which is sans-IO: it
//! maps SDP and frame events to byte chunks, so the whole prologue and
//! gating logic is testable without sockets.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;

use crate::error::{Error, Result, RtspError};
use crate::media::flv::{FlvHeader, FlvTag};
use crate::media::h264::{NaluType, NAL_TYPE_MASK};
use crate::media::timestamp::TimestampNormalizer;
use crate::registry::store::Attachment;
use crate::registry::{SourceEvent, SourceRegistry};
use crate::rtsp::dialog::parse_sprop;
use crate::sdp::Sdp;
use crate::url::Url;

/// Cap on the viewer's HTTP request size
const MAX_REQUEST_BYTES: usize = 2048;

/// Turns source events into the FLV byte stream for one viewer.
///
/// State per viewer: one timestamp normalizer per media kind and the
/// `sent_key` flag that holds back inter frames until the first IDR.
#[derive(Debug, Default)]
pub struct FlvSink {
    prologue_sent: bool,
    avc_header_sent: bool,
    sent_key: bool,
    video_ts: Option<TimestampNormalizer>,
    audio_ts: Option<TimestampNormalizer>,
}

impl FlvSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prologue_sent(&self) -> bool {
        self.prologue_sent
    }

    /// After a lag on the broadcast channel, frames were lost; hold
    /// inter frames again until the next IDR resynchronizes the decoder.
    pub fn resync(&mut self) {
        self.sent_key = false;
    }

    /// The HTTP response line and the FLV prologue: header, zero
    /// PreviousTagSize, AVC sequence header from the video fmtp, and the
    /// AAC sequence header when MPEG4-GENERIC audio is advertised.
    pub fn on_sdp(&mut self, sdp: &Sdp) -> Bytes {
        let mut out = BytesMut::new();
        out.extend_from_slice(b"HTTP/1.0 200 OK\r\nContent-Type: video/x-flv\r\n\r\n");

        let has_audio = sdp.media("audio").is_some();
        out.extend_from_slice(&FlvHeader::new(has_audio).to_bytes());
        out.put_u32(0);

        self.video_ts = Some(TimestampNormalizer::new(90_000));
        if let Some((sps, pps)) = sdp
            .media("video")
            .and_then(|video| video.attribute("fmtp"))
            .and_then(parse_sprop)
        {
            out.extend_from_slice(&FlvTag::avc_sequence_header(&sps, &pps).into_body());
            self.avc_header_sent = true;
        }

        if let Some(rtpmap) = sdp.media("audio").and_then(|audio| audio.attribute("rtpmap")) {
            // e.g. "97 MPEG4-GENERIC/44100/2"
            let mut parts = rtpmap
                .split_whitespace()
                .nth(1)
                .unwrap_or("")
                .split('/');
            let encoding = parts.next().unwrap_or("");
            if encoding.eq_ignore_ascii_case("MPEG4-GENERIC") {
                let clock_rate = parts.next().and_then(|r| r.parse().ok()).unwrap_or(44_100);
                let channels = parts.next().and_then(|c| c.parse().ok()).unwrap_or(1);
                out.extend_from_slice(&FlvTag::aac_sequence_header(clock_rate, channels).into_body());
                self.audio_ts = Some(TimestampNormalizer::new(clock_rate));
            }
        }

        self.prologue_sent = true;
        out.freeze()
    }

    /// Encode one video NAL. IDRs go out as key tags carrying SPS, PPS
    /// and the frame; non-IDR slices only once a key frame has been sent.
    pub fn on_video(&mut self, frame: &Bytes, timestamp: u32, sps: &Bytes, pps: &Bytes) -> Option<Bytes> {
        let normalizer = self.video_ts.as_mut()?;
        let nalu_type = frame.first()? & NAL_TYPE_MASK;

        if nalu_type == NaluType::Idr as u8 {
            let ms = normalizer.normalize(timestamp);
            let mut out = BytesMut::new();
            if !self.avc_header_sent {
                // parameter sets arrived in-band, not via sprop
                out.extend_from_slice(&FlvTag::avc_sequence_header(sps, pps).into_body());
                self.avc_header_sent = true;
            }
            out.extend_from_slice(&FlvTag::avc_key_frame(sps, pps, frame, ms).into_body());
            self.sent_key = true;
            Some(out.freeze())
        } else if nalu_type == NaluType::Slice as u8 && self.sent_key {
            let ms = normalizer.normalize(timestamp);
            Some(FlvTag::avc_inter_frame(frame, ms).into_body())
        } else {
            None
        }
    }

    /// Encode one raw AAC frame
    pub fn on_audio(&mut self, sample: &Bytes, timestamp: u32) -> Option<Bytes> {
        let normalizer = self.audio_ts.as_mut()?;
        let ms = normalizer.normalize(timestamp);
        Some(FlvTag::aac_raw(sample, ms).into_body())
    }
}

/// Parse the viewer's request line: `GET /<rtsp-url> HTTP/1.x`
pub fn parse_request(request: &str) -> Result<Url> {
    let line = request.split("\r\n").next().unwrap_or("");
    if !line.starts_with("GET ") {
        return Err(RtspError::InvalidUrl(line.to_string()).into());
    }
    let target = line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| RtspError::InvalidUrl(line.to_string()))?;
    Url::parse(target.trim_start_matches('/'))
}

/// One downstream viewer connection
pub struct SinkSession {
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<SourceRegistry>,
}

impl SinkSession {
    pub fn new(stream: TcpStream, peer: SocketAddr, registry: Arc<SourceRegistry>) -> Self {
        Self {
            stream,
            peer,
            registry,
        }
    }

    /// Serve the viewer until it hangs up or its source dies
    pub async fn run(mut self) -> Result<()> {
        let request = self.read_request().await?;
        let url = match parse_request(&request) {
            Ok(url) => url,
            Err(e) => {
                self.reject(&e).await?;
                return Err(e);
            }
        };
        tracing::info!(peer = %self.peer, url = %url, "viewer requested stream");

        let attachment = self.registry.attach(&url).await;
        let key = attachment.key.clone();
        let result = self.stream_flv(attachment).await;
        self.registry.detach(&key).await;
        tracing::debug!(peer = %self.peer, "viewer closed");
        result
    }

    async fn read_request(&mut self) -> Result<String> {
        let mut request = Vec::new();
        let mut chunk = [0u8; 512];
        loop {
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(Error::EndOfStream);
            }
            request.extend_from_slice(&chunk[..n]);
            if request.windows(4).any(|w| w == b"\r\n\r\n") {
                return Ok(String::from_utf8_lossy(&request).into_owned());
            }
            if request.len() > MAX_REQUEST_BYTES {
                return Err(RtspError::ProtocolViolation("oversized http request").into());
            }
        }
    }

    async fn reject(&mut self, reason: &Error) -> Result<()> {
        let response = format!("HTTP/1.0 400 Bad Request\r\nWarning: {}\r\n\r\n", reason);
        self.stream.write_all(response.as_bytes()).await?;
        tracing::warn!(peer = %self.peer, reason = %reason, "viewer rejected");
        Ok(())
    }

    async fn stream_flv(&mut self, mut attachment: Attachment) -> Result<()> {
        let mut encoder = FlvSink::new();
        let (mut viewer_rd, mut viewer_wr) = self.stream.split();

        // a late joiner gets the prologue from the cached SDP right away
        if let Some(sdp) = attachment.sdp.take() {
            viewer_wr.write_all(&encoder.on_sdp(&sdp)).await?;
        }

        let mut probe = [0u8; 512];
        loop {
            tokio::select! {
                event = attachment.events.recv() => match event {
                    Ok(SourceEvent::Sdp(sdp)) => {
                        if !encoder.prologue_sent() {
                            viewer_wr.write_all(&encoder.on_sdp(&sdp)).await?;
                        }
                    }
                    Ok(SourceEvent::Video { frame, timestamp, sps, pps }) => {
                        if let Some(bytes) = encoder.on_video(&frame, timestamp, &sps, &pps) {
                            viewer_wr.write_all(&bytes).await?;
                        }
                    }
                    Ok(SourceEvent::Audio { sample, timestamp }) => {
                        if let Some(bytes) = encoder.on_audio(&sample, timestamp) {
                            viewer_wr.write_all(&bytes).await?;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(peer = %self.peer, skipped, "viewer lagging, waiting for next key frame");
                        encoder.resync();
                    }
                    Err(RecvError::Closed) => {
                        // the upstream died; a viewer that never got its
                        // prologue still deserves an answer
                        if !encoder.prologue_sent() {
                            let response = "HTTP/1.0 400 Bad Request\r\nWarning: upstream source closed\r\n\r\n";
                            viewer_wr.write_all(response.as_bytes()).await?;
                        }
                        return Ok(());
                    }
                },
                read = viewer_rd.read(&mut probe) => {
                    if read? == 0 {
                        return Ok(());
                    }
                    // anything else the viewer sends is ignored
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SDP_BOTH: &str = "v=0\r\n\
                            m=video 0 RTP/AVP 96\r\n\
                            a=control:trackID=1\r\n\
                            a=fmtp:96 sprop-parameter-sets=Z0IAH5WoFAFu,aM48gA==\r\n\
                            m=audio 0 RTP/AVP 97\r\n\
                            a=rtpmap:97 MPEG4-GENERIC/44100/2\r\n\
                            a=control:trackID=2\r\n";

    const SDP_VIDEO: &str = "v=0\r\n\
                             m=video 0 RTP/AVP 96\r\n\
                             a=control:trackID=1\r\n\
                             a=fmtp:96 sprop-parameter-sets=Z0IAH5WoFAFu,aM48gA==\r\n";

    fn sprop() -> (Bytes, Bytes) {
        parse_sprop("sprop-parameter-sets=Z0IAH5WoFAFu,aM48gA==").unwrap()
    }

    #[test]
    fn test_prologue_layout_with_audio() {
        let mut sink = FlvSink::new();
        let out = sink.on_sdp(&Sdp::parse(SDP_BOTH));

        let http_end = b"HTTP/1.0 200 OK\r\nContent-Type: video/x-flv\r\n\r\n".len();
        assert!(out.starts_with(b"HTTP/1.0 200 OK\r\nContent-Type: video/x-flv\r\n\r\n"));

        // FLV header with the audio flag, then PreviousTagSize0
        assert_eq!(
            &out[http_end..http_end + 9],
            &[0x46, 0x4c, 0x56, 0x01, 0x05, 0x00, 0x00, 0x00, 0x09]
        );
        assert_eq!(&out[http_end + 9..http_end + 13], &[0, 0, 0, 0]);

        // AVC sequence header tag first, AAC sequence header after it
        assert_eq!(out[http_end + 13], 9);
        let avc_len = {
            let at = http_end + 13;
            let data_len =
                ((out[at + 1] as usize) << 16) | ((out[at + 2] as usize) << 8) | out[at + 3] as usize;
            11 + data_len + 4
        };
        let aac_at = http_end + 13 + avc_len;
        assert_eq!(out[aac_at], 8);
        assert_eq!(out[aac_at + 11], 0xAF);
        assert_eq!(out[aac_at + 12], 0x00);
        assert_eq!(&out[aac_at + 13..aac_at + 15], &[0x12, 0x10]);

        assert!(sink.prologue_sent());
    }

    #[test]
    fn test_prologue_without_audio_has_no_aac_header() {
        let mut sink = FlvSink::new();
        let out = sink.on_sdp(&Sdp::parse(SDP_VIDEO));

        let http_end = b"HTTP/1.0 200 OK\r\nContent-Type: video/x-flv\r\n\r\n".len();
        // audio flag clear
        assert_eq!(out[http_end + 4], 0x01);
        // exactly one tag (the AVC sequence header) after PreviousTagSize0
        assert_eq!(out[http_end + 13], 9);
        let data_len = {
            let at = http_end + 13;
            ((out[at + 1] as usize) << 16) | ((out[at + 2] as usize) << 8) | out[at + 3] as usize
        };
        assert_eq!(out.len(), http_end + 13 + 11 + data_len + 4);
    }

    #[test]
    fn test_inter_frames_held_until_first_idr() {
        let mut sink = FlvSink::new();
        sink.on_sdp(&Sdp::parse(SDP_VIDEO));
        let (sps, pps) = sprop();

        let inter = Bytes::from_static(&[0x41, 0x9a]);
        assert!(sink.on_video(&inter, 0, &sps, &pps).is_none());

        let idr = Bytes::from_static(&[0x65, 0x88]);
        let key_tag = sink.on_video(&idr, 3600, &sps, &pps).unwrap();
        assert_eq!(key_tag[11], 0x17);

        let inter_tag = sink.on_video(&inter, 7200, &sps, &pps).unwrap();
        assert_eq!(inter_tag[11], 0x27);
    }

    #[test]
    fn test_key_frame_payload_carries_parameter_sets() {
        let mut sink = FlvSink::new();
        sink.on_sdp(&Sdp::parse(SDP_VIDEO));
        let (sps, pps) = sprop();

        let idr = Bytes::from(vec![0x65u8; 1501]);
        let tag = sink.on_video(&idr, 0, &sps, &pps).unwrap();

        let mut at = 16;
        assert_eq!(&tag[at..at + 4], &(sps.len() as u32).to_be_bytes());
        at += 4 + sps.len();
        assert_eq!(&tag[at..at + 4], &(pps.len() as u32).to_be_bytes());
        at += 4 + pps.len();
        // 1501 = 0x5DD
        assert_eq!(&tag[at..at + 4], &[0x00, 0x00, 0x05, 0xDD]);
    }

    #[test]
    fn test_timestamps_relative_to_first_frame() {
        let mut sink = FlvSink::new();
        sink.on_sdp(&Sdp::parse(SDP_VIDEO));
        let (sps, pps) = sprop();

        let idr = Bytes::from_static(&[0x65]);
        let first = sink.on_video(&idr, 900_000, &sps, &pps).unwrap();
        assert_eq!(&first[4..8], &[0, 0, 0, 0]);

        let second = sink.on_video(&idr, 903_600, &sps, &pps).unwrap();
        assert_eq!(&second[4..7], &[0, 0, 40]);
    }

    #[test]
    fn test_resync_waits_for_next_key() {
        let mut sink = FlvSink::new();
        sink.on_sdp(&Sdp::parse(SDP_VIDEO));
        let (sps, pps) = sprop();

        sink.on_video(&Bytes::from_static(&[0x65]), 0, &sps, &pps);
        assert!(sink
            .on_video(&Bytes::from_static(&[0x41]), 3600, &sps, &pps)
            .is_some());

        sink.resync();
        assert!(sink
            .on_video(&Bytes::from_static(&[0x41]), 7200, &sps, &pps)
            .is_none());
        assert!(sink
            .on_video(&Bytes::from_static(&[0x65]), 10_800, &sps, &pps)
            .is_some());
    }

    #[test]
    fn test_in_band_parameter_sets_synthesize_avc_header() {
        // no sprop in the SDP: the sequence header rides with the first IDR
        let mut sink = FlvSink::new();
        sink.on_sdp(&Sdp::parse(
            "v=0\r\nm=video 0 RTP/AVP 96\r\na=control:trackID=1\r\n",
        ));
        let (sps, pps) = sprop();

        let out = sink
            .on_video(&Bytes::from_static(&[0x65, 0x01]), 0, &sps, &pps)
            .unwrap();
        // first tag is the AVC sequence header, then the key frame tag
        assert_eq!(out[11], 0x17);
        assert_eq!(out[12], 0x00); // sequence header packet
        let first_len = {
            let data_len =
                ((out[1] as usize) << 16) | ((out[2] as usize) << 8) | out[3] as usize;
            11 + data_len + 4
        };
        assert_eq!(out[first_len + 12], 0x01); // NALU packet follows
    }

    #[test]
    fn test_audio_without_normalizer_dropped() {
        let mut sink = FlvSink::new();
        sink.on_sdp(&Sdp::parse(SDP_VIDEO));
        assert!(sink.on_audio(&Bytes::from_static(&[0x21]), 0).is_none());
    }

    #[test]
    fn test_audio_tag_timestamps() {
        let mut sink = FlvSink::new();
        sink.on_sdp(&Sdp::parse(SDP_BOTH));

        let sample = Bytes::from_static(&[0x21, 0x00]);
        let first = sink.on_audio(&sample, 44_100).unwrap();
        assert_eq!(&first[4..8], &[0, 0, 0, 0]);
        // 1024 samples at 44.1 kHz is 23.2 ms
        let second = sink.on_audio(&sample, 44_100 + 1024).unwrap();
        assert_eq!(&second[4..7], &[0, 0, 23]);
    }

    #[test]
    fn test_parse_request_line() {
        let url = parse_request("GET /rtsp://10.0.0.1:554/cam HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(url.host, "10.0.0.1");
        assert_eq!(url.content, "/cam");
    }

    #[test]
    fn test_parse_request_rejects_non_get() {
        assert!(parse_request("POST /rtsp://h/p HTTP/1.1\r\n\r\n").is_err());
        assert!(parse_request("nonsense").is_err());
    }

    #[test]
    fn test_parse_request_rejects_bad_url() {
        assert!(parse_request("GET /http://h/p HTTP/1.1\r\n\r\n").is_err());
    }
}
