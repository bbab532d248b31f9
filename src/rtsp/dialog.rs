//! RTSP client dialog (RFC 2326)
//!
//! Drives one upstream session through
//! `OPTIONS → DESCRIBE → SETUP(video[,audio]) → PLAY` and keeps it alive
//! with periodic OPTIONS once playing. The dialog is sans-IO: the owner
//! feeds it raw bytes from the socket and writes back whatever request
//! bytes it produces, so the whole state machine is testable without a
//! network.
//!
//! Responses are parsed line-oriented; the first `\r\n\r\n` separates the
//! headers from an optional body sized by `Content-Length`. Several
//! responses arriving in one TCP read are processed in order. Only 200
//! and 401 are survivable; 401 installs Basic or Digest-MD5 authorization
//! and retries DESCRIBE, bounded to five attempts.

use std::sync::Arc;
use std::time::Duration;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use bytes::{Bytes, BytesMut};

use crate::error::{Result, RtspError};
use crate::sdp::Sdp;

use super::auth::{Authorization, Challenge};
use super::framer::Channel;

/// User agent announced in every request
pub const USER_AGENT: &str = "debug-cdn";

/// Consecutive 401 responses tolerated before giving up
const MAX_AUTH_FAILURES: u32 = 4;

/// State of one upstream dialog; transitions are strictly forward under
/// normal flow, and a 401 never changes state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Connected, OPTIONS sent
    Initial,
    /// SDP parsed, SETUP in flight
    Described,
    /// All tracks set up, PLAY about to go out
    Setup,
    /// PLAY sent, waiting for its response
    AskPlaying,
    /// Interleaved RTP is flowing
    Playing,
}

/// What a round of response processing produced
#[derive(Debug, Default)]
pub struct DialogProgress {
    /// Request bytes to write upstream
    pub send: Option<Bytes>,
    /// Set on the round that parsed the DESCRIBE body
    pub sdp_ready: bool,
}

/// One parsed RTSP response
#[derive(Debug)]
struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
}

/// Enumerated header names the dialog acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderTag {
    CSeq,
    Public,
    ContentBase,
    Session,
    Transport,
    WwwAuthenticate,
    Other,
}

impl HeaderTag {
    fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("CSeq") {
            HeaderTag::CSeq
        } else if name.eq_ignore_ascii_case("Public") {
            HeaderTag::Public
        } else if name.eq_ignore_ascii_case("Content-Base") {
            HeaderTag::ContentBase
        } else if name.eq_ignore_ascii_case("Session") {
            HeaderTag::Session
        } else if name.eq_ignore_ascii_case("Transport") {
            HeaderTag::Transport
        } else if name.eq_ignore_ascii_case("WWW-Authenticate") {
            HeaderTag::WwwAuthenticate
        } else {
            HeaderTag::Other
        }
    }
}

fn find_crlf_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Scan raw header bytes for Content-Length without a full parse
fn scan_content_length(headers: &[u8]) -> usize {
    let text = String::from_utf8_lossy(headers);
    for line in text.split("\r\n") {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("Content-Length") {
                return value.trim().parse().unwrap_or(0);
            }
        }
    }
    0
}

/// The per-source RTSP client state machine
#[derive(Debug)]
pub struct RtspDialog {
    credentials: Option<(String, String)>,
    content: String,
    url: String,
    content_base: String,
    sequence: u32,
    session: String,
    timeout_secs: u64,
    state: SourceState,
    status: u16,
    sdp: Option<Arc<Sdp>>,
    range: Option<(String, String)>,
    sprop: Option<(Bytes, Bytes)>,
    authorization: Authorization,
    auth_failures: u32,
    keepalive: String,
}

impl RtspDialog {
    pub fn new(credentials: Option<(String, String)>, content: &str) -> Self {
        Self {
            credentials,
            content: content.to_string(),
            url: String::new(),
            content_base: String::new(),
            sequence: 1,
            session: String::new(),
            timeout_secs: 0,
            state: SourceState::Initial,
            status: 0,
            sdp: None,
            range: None,
            sprop: None,
            authorization: Authorization::new(),
            auth_failures: 0,
            keepalive: String::new(),
        }
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    /// Status code of the last processed response
    pub fn last_status(&self) -> u16 {
        self.status
    }

    /// The stream URL, available after [`initial_request`](Self::initial_request)
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The parsed DESCRIBE body, once available
    pub fn sdp(&self) -> Option<&Arc<Sdp>> {
        self.sdp.as_ref()
    }

    /// SPS/PPS from the SDP `sprop-parameter-sets`, when present
    pub fn parameter_sets(&self) -> Option<(Bytes, Bytes)> {
        self.sprop.clone()
    }

    /// Keepalive period: three seconds short of the server's session
    /// timeout, unknown before SETUP completes
    pub fn keepalive_interval(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            return None;
        }
        Some(Duration::from_secs(self.timeout_secs.saturating_sub(3).max(1)))
    }

    /// Reset to `Initial`, wiping the session; authorization survives so a
    /// reconnect does not have to re-earn its challenge
    pub fn clear(&mut self) {
        self.state = SourceState::Initial;
        self.session.clear();
        self.timeout_secs = 0;
        self.status = 0;
    }

    /// Compose the opening OPTIONS request; the same bytes are cached as
    /// the keepalive message
    pub fn initial_request(&mut self, host: &str, port: u16) -> Bytes {
        if self.content.is_empty() {
            self.content = "/".to_string();
        }
        self.url = format!("rtsp://{}:{}{}", host, port, self.content);
        self.keepalive = format!(
            "OPTIONS {} RTSP/1.0\r\nCSeq: {}\r\nUser-Agent: {}\r\n{}\r\n",
            self.url,
            self.sequence,
            USER_AGENT,
            self.authorization.header_line("OPTIONS", &self.url)
        );
        tracing::debug!(request = %self.keepalive, "rtsp request");
        Bytes::from(self.keepalive.clone())
    }

    /// The cached OPTIONS keepalive, resent verbatim while playing
    pub fn keepalive_request(&self) -> Bytes {
        Bytes::from(self.keepalive.clone())
    }

    /// Consume every complete response in `buffer`. Once the dialog
    /// reaches `Playing`, remaining bytes are left for the RTP framer.
    pub fn on_bytes(&mut self, buffer: &mut BytesMut) -> Result<DialogProgress> {
        let mut send = BytesMut::new();
        let mut progress = DialogProgress::default();

        while self.state != SourceState::Playing {
            let Some(header_end) = find_crlf_crlf(buffer) else {
                break;
            };
            let body_len = scan_content_length(&buffer[..header_end]);
            let total = header_end + 4 + body_len;
            if buffer.len() < total {
                break;
            }
            let raw = buffer.split_to(total).freeze();
            let response = Response::parse(&raw, header_end, body_len)?;
            tracing::debug!(
                status = response.status,
                headers = %String::from_utf8_lossy(&raw[..header_end]),
                "rtsp response"
            );

            let (out, sdp_ready) = self.on_response(&response)?;
            if let Some(out) = out {
                tracing::debug!(request = %String::from_utf8_lossy(&out), "rtsp request");
                send.extend_from_slice(&out);
            }
            progress.sdp_ready |= sdp_ready;
        }

        if !send.is_empty() {
            progress.send = Some(send.freeze());
        }
        Ok(progress)
    }

    fn on_response(&mut self, response: &Response) -> Result<(Option<Bytes>, bool)> {
        self.status = response.status;
        if response.status != 200 && response.status != 401 {
            return Err(RtspError::SourceNotFound {
                url: self.url.clone(),
                status: response.status,
            }
            .into());
        }

        let answering_play = self.state == SourceState::AskPlaying;
        let mut send = None;
        let mut saw_content_base = false;

        for (name, value) in &response.headers {
            match HeaderTag::from_name(name) {
                HeaderTag::CSeq => {
                    if let Ok(cseq) = value.trim().parse::<u32>() {
                        self.sequence = cseq + 1;
                    }
                }
                HeaderTag::Public => {
                    if response.status == 200 && self.state == SourceState::Initial {
                        send = Some(self.describe_request());
                    }
                }
                HeaderTag::ContentBase => {
                    self.content_base = value.trim().to_string();
                    saw_content_base = true;
                }
                HeaderTag::Session => self.on_session(value),
                HeaderTag::Transport => {
                    if let Some(out) = self.on_transport(value)? {
                        send = Some(out);
                    }
                }
                HeaderTag::WwwAuthenticate => {
                    if response.status == 401 {
                        send = Some(self.on_authenticate(value)?);
                    }
                }
                HeaderTag::Other => {}
            }
        }

        let mut sdp_ready = false;
        if response.status == 200 && saw_content_base && !response.body.is_empty() {
            send = Some(self.on_describe_body(&response.body)?);
            sdp_ready = true;
        }

        if self.state == SourceState::Setup {
            send = Some(self.play_request());
        }
        if answering_play && response.status == 200 {
            self.state = SourceState::Playing;
            tracing::info!(url = %self.url, "upstream playing");
        }

        Ok((send, sdp_ready))
    }

    fn on_session(&mut self, value: &str) {
        if !self.session.is_empty() {
            return;
        }
        let mut parts = value.trim().split(';');
        self.session = parts.next().unwrap_or("").trim().to_string();
        for part in parts {
            if let Some((name, timeout)) = part.trim().split_once('=') {
                if name.eq_ignore_ascii_case("timeout") {
                    self.timeout_secs = timeout.trim().parse().unwrap_or(0);
                }
            }
        }
    }

    fn on_transport(&mut self, value: &str) -> Result<Option<Bytes>> {
        let granted = value
            .split("interleaved=")
            .nth(1)
            .and_then(|rest| rest.split(['-', ';']).next())
            .and_then(|n| n.trim().parse::<u8>().ok())
            .ok_or(RtspError::ProtocolViolation(
                "transport without interleaved channels",
            ))?;

        if granted == Channel::Video as u8 {
            if let Some(control) = self
                .sdp
                .as_ref()
                .and_then(|sdp| sdp.media("audio"))
                .and_then(|audio| audio.attribute("control"))
                .map(str::to_string)
            {
                self.state = SourceState::Described;
                return Ok(Some(self.setup_request(&control, Channel::Audio, Channel::AudioRtcp)));
            }
        }
        self.state = SourceState::Setup;
        Ok(None)
    }

    fn on_authenticate(&mut self, value: &str) -> Result<Bytes> {
        if self.auth_failures > MAX_AUTH_FAILURES {
            let user = self
                .credentials
                .as_ref()
                .map(|(u, _)| u.clone())
                .unwrap_or_default();
            return Err(RtspError::CredentialsNotAccepted(user).into());
        }
        self.auth_failures += 1;

        let (user, pass) = self.credentials.clone().unwrap_or_default();
        if let Some(challenge) = Challenge::parse(value) {
            match challenge.scheme {
                super::auth::Scheme::Basic => self.authorization.set_basic(&user, &pass),
                super::auth::Scheme::Digest => {
                    let url = self.url.clone();
                    self.authorization.set_digest(&challenge, &user, &pass, &url)
                }
            }
        }
        Ok(self.describe_request())
    }

    fn on_describe_body(&mut self, body: &[u8]) -> Result<Bytes> {
        let text = std::str::from_utf8(body)
            .map_err(|_| RtspError::InvalidSdp("body is not valid UTF-8".to_string()))?;
        let sdp = Sdp::parse(text);

        let video = sdp
            .media("video")
            .ok_or_else(|| RtspError::InvalidSdp(format!("no video media in:\n{}", sdp)))?;
        let control = video
            .attribute("control")
            .ok_or_else(|| RtspError::InvalidSdp(format!("video without control in:\n{}", sdp)))?
            .to_string();

        if let Some(fmtp) = video.attribute("fmtp") {
            self.sprop = parse_sprop(fmtp);
        }
        if self.range.is_none() {
            if let Some(range) = video.attribute("range") {
                if let Some((_, bounds)) = range.split_once('=') {
                    let (start, end) = bounds.split_once('-').unwrap_or((bounds, ""));
                    self.range = Some((start.to_string(), end.to_string()));
                }
            }
        }

        self.sdp = Some(Arc::new(sdp));
        self.state = SourceState::Described;
        Ok(self.setup_request(&control, Channel::Video, Channel::VideoRtcp))
    }

    fn resolve_control(&self, control: &str) -> String {
        if control.starts_with("rtsp://") {
            return control.to_string();
        }
        if self.content_base.ends_with('/') {
            format!("{}{}", self.content_base, control)
        } else {
            format!("{}/{}", self.content_base, control)
        }
    }

    fn describe_request(&self) -> Bytes {
        Bytes::from(format!(
            "DESCRIBE {} RTSP/1.0\r\nAccept: application/sdp\r\nCSeq: {}\r\nUser-Agent: {}\r\n{}\r\n",
            self.url,
            self.sequence,
            USER_AGENT,
            self.authorization.header_line("DESCRIBE", &self.url)
        ))
    }

    fn setup_request(&self, control: &str, rtp: Channel, rtcp: Channel) -> Bytes {
        let url = self.resolve_control(control);
        let session = if self.session.is_empty() {
            String::new()
        } else {
            format!("Session: {}\r\n", self.session)
        };
        Bytes::from(format!(
            "SETUP {} RTSP/1.0\r\nTransport: RTP/AVP/TCP;unicast;interleaved={}-{}\r\nCSeq: {}\r\n{}User-Agent: {}\r\n{}\r\n",
            url,
            rtp as u8,
            rtcp as u8,
            self.sequence,
            session,
            USER_AGENT,
            self.authorization.header_line("SETUP", &self.url)
        ))
    }

    fn play_request(&mut self) -> Bytes {
        self.state = SourceState::AskPlaying;
        let range = match &self.range {
            Some((start, end)) => {
                let kind = if start.contains('T') { "clock" } else { "npt" };
                format!("{}={}-{}", kind, start, end)
            }
            None => "npt=now--".to_string(),
        };
        Bytes::from(format!(
            "PLAY {} RTSP/1.0\r\nCSeq: {}\r\nRange: {}\r\nUser-Agent: {}\r\nSession: {}\r\n{}\r\n",
            self.content_base,
            self.sequence,
            range,
            USER_AGENT,
            self.session,
            self.authorization.header_line("PLAY", &self.url)
        ))
    }
}

impl Response {
    fn parse(raw: &Bytes, header_end: usize, body_len: usize) -> Result<Self> {
        let text = std::str::from_utf8(&raw[..header_end])
            .map_err(|_| RtspError::ProtocolViolation("response headers are not UTF-8"))?;
        let mut lines = text.split("\r\n");

        let status_line = lines
            .next()
            .ok_or(RtspError::ProtocolViolation("empty response"))?;
        let status = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .ok_or(RtspError::ProtocolViolation("malformed status line"))?;

        let headers = lines
            .filter_map(|line| {
                line.split_once(':')
                    .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            })
            .collect();

        Ok(Self {
            status,
            headers,
            body: raw.slice(header_end + 4..header_end + 4 + body_len),
        })
    }
}

/// Decode `sprop-parameter-sets=<base64 sps>,<base64 pps>` out of a video
/// `fmtp` attribute
pub fn parse_sprop(fmtp: &str) -> Option<(Bytes, Bytes)> {
    let sprop = fmtp
        .split("sprop-parameter-sets=")
        .nth(1)?
        .split(';')
        .next()?;
    let (sps, pps) = sprop.split_once(',')?;
    let sps = BASE64_STANDARD.decode(sps.trim()).ok()?;
    let pps = BASE64_STANDARD.decode(pps.trim()).ok()?;
    Some((Bytes::from(sps), Bytes::from(pps)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtsp::auth::digest_response;

    const SDP_VIDEO_ONLY: &str = "v=0\r\n\
                                  o=- 1 1 IN IP4 10.0.0.1\r\n\
                                  s=Live\r\n\
                                  m=video 0 RTP/AVP 96\r\n\
                                  a=control:trackID=1\r\n\
                                  a=fmtp:96 packetization-mode=1;sprop-parameter-sets=Z0IAH5WoFAFu,aM48gA==\r\n";

    const SDP_VIDEO_AUDIO: &str = "v=0\r\n\
                                   o=- 1 1 IN IP4 10.0.0.1\r\n\
                                   s=Live\r\n\
                                   m=video 0 RTP/AVP 96\r\n\
                                   a=control:trackID=1\r\n\
                                   a=fmtp:96 sprop-parameter-sets=Z0IAH5WoFAFu,aM48gA==\r\n\
                                   m=audio 0 RTP/AVP 97\r\n\
                                   a=rtpmap:97 MPEG4-GENERIC/44100/2\r\n\
                                   a=control:trackID=2\r\n";

    fn dialog() -> RtspDialog {
        let mut dialog = RtspDialog::new(Some(("u".into(), "p".into())), "/p");
        let options = dialog.initial_request("h", 554);
        assert!(options.starts_with(b"OPTIONS rtsp://h:554/p RTSP/1.0\r\n"));
        dialog
    }

    fn feed(dialog: &mut RtspDialog, bytes: &[u8]) -> DialogProgress {
        let mut buffer = BytesMut::from(bytes);
        dialog.on_bytes(&mut buffer).unwrap()
    }

    fn describe_response(sdp: &str) -> String {
        format!(
            "RTSP/1.0 200 OK\r\nCSeq: 2\r\nContent-Base: rtsp://h:554/p/\r\nContent-Length: {}\r\n\r\n{}",
            sdp.len(),
            sdp
        )
    }

    fn options_ok(dialog: &mut RtspDialog) -> DialogProgress {
        feed(
            dialog,
            b"RTSP/1.0 200 OK\r\nCSeq: 1\r\nPublic: OPTIONS, DESCRIBE, SETUP, PLAY\r\n\r\n",
        )
    }

    #[test]
    fn test_options_triggers_describe() {
        let mut dialog = dialog();
        let progress = options_ok(&mut dialog);

        let request = String::from_utf8(progress.send.unwrap().to_vec()).unwrap();
        assert!(request.starts_with("DESCRIBE rtsp://h:554/p RTSP/1.0\r\n"));
        assert!(request.contains("Accept: application/sdp\r\n"));
        assert!(request.contains("CSeq: 2\r\n"));
        assert!(request.contains("User-Agent: debug-cdn\r\n"));
        assert_eq!(dialog.state(), SourceState::Initial);
    }

    #[test]
    fn test_describe_triggers_video_setup() {
        let mut dialog = dialog();
        options_ok(&mut dialog);
        let progress = feed(&mut dialog, describe_response(SDP_VIDEO_ONLY).as_bytes());

        assert!(progress.sdp_ready);
        assert_eq!(dialog.state(), SourceState::Described);
        assert!(dialog.sdp().is_some());
        assert!(dialog.parameter_sets().is_some());

        let request = String::from_utf8(progress.send.unwrap().to_vec()).unwrap();
        assert!(request.starts_with("SETUP rtsp://h:554/p/trackID=1 RTSP/1.0\r\n"));
        assert!(request.contains("Transport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n"));
        assert!(request.contains("CSeq: 3\r\n"));
    }

    #[test]
    fn test_video_only_setup_goes_straight_to_play() {
        let mut dialog = dialog();
        options_ok(&mut dialog);
        feed(&mut dialog, describe_response(SDP_VIDEO_ONLY).as_bytes());
        let progress = feed(
            &mut dialog,
            b"RTSP/1.0 200 OK\r\nCSeq: 3\r\nSession: 42;timeout=60\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n",
        );

        let request = String::from_utf8(progress.send.unwrap().to_vec()).unwrap();
        assert!(request.starts_with("PLAY rtsp://h:554/p/ RTSP/1.0\r\n"));
        assert!(request.contains("Range: npt=now--\r\n"));
        assert!(request.contains("Session: 42\r\n"));
        assert_eq!(dialog.state(), SourceState::AskPlaying);
        assert_eq!(dialog.keepalive_interval(), Some(Duration::from_secs(57)));
    }

    #[test]
    fn test_audio_setup_between_video_and_play() {
        let mut dialog = dialog();
        options_ok(&mut dialog);
        feed(&mut dialog, describe_response(SDP_VIDEO_AUDIO).as_bytes());

        // video SETUP answered: audio is advertised, so SETUP it next
        let progress = feed(
            &mut dialog,
            b"RTSP/1.0 200 OK\r\nCSeq: 3\r\nSession: 42;timeout=60\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n",
        );
        let request = String::from_utf8(progress.send.unwrap().to_vec()).unwrap();
        assert!(request.starts_with("SETUP rtsp://h:554/p/trackID=2 RTSP/1.0\r\n"));
        assert!(request.contains("interleaved=2-3\r\n"));
        assert!(request.contains("Session: 42\r\n"));
        assert_eq!(dialog.state(), SourceState::Described);

        // audio SETUP answered: now PLAY
        let progress = feed(
            &mut dialog,
            b"RTSP/1.0 200 OK\r\nCSeq: 4\r\nSession: 42\r\nTransport: RTP/AVP/TCP;unicast;interleaved=2-3\r\n\r\n",
        );
        let request = String::from_utf8(progress.send.unwrap().to_vec()).unwrap();
        assert!(request.starts_with("PLAY "));
        assert_eq!(dialog.state(), SourceState::AskPlaying);
    }

    #[test]
    fn test_play_response_reaches_playing() {
        let mut dialog = dialog();
        options_ok(&mut dialog);
        feed(&mut dialog, describe_response(SDP_VIDEO_ONLY).as_bytes());
        feed(
            &mut dialog,
            b"RTSP/1.0 200 OK\r\nCSeq: 3\r\nSession: 42;timeout=60\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n",
        );

        // the PLAY response and the first interleaved byte in one read
        let mut buffer = BytesMut::from(
            &b"RTSP/1.0 200 OK\r\nCSeq: 4\r\nSession: 42\r\n\r\n\x24\x00"[..],
        );
        let progress = dialog.on_bytes(&mut buffer).unwrap();
        assert!(progress.send.is_none());
        assert_eq!(dialog.state(), SourceState::Playing);
        // leftover bytes stay for the framer
        assert_eq!(&buffer[..], &[0x24, 0x00]);
    }

    #[test]
    fn test_digest_challenge_retries_describe() {
        let mut dialog = dialog();
        let progress = feed(
            &mut dialog,
            b"RTSP/1.0 401 Unauthorized\r\nCSeq: 1\r\nWWW-Authenticate: Digest realm=\"r\", nonce=\"n\"\r\n\r\n",
        );

        let request = String::from_utf8(progress.send.unwrap().to_vec()).unwrap();
        assert!(request.starts_with("DESCRIBE rtsp://h:554/p RTSP/1.0\r\n"));
        assert!(request.contains(
            "Authorization: Digest username=\"u\", realm=\"r\", nonce=\"n\", uri=\"rtsp://h:554/p\", algorithm=\"MD5\", response=\""
        ));

        let ha1 = format!("{:x}", md5::compute(b"u:r:p"));
        let expected = digest_response(&ha1, "n", "DESCRIBE", "rtsp://h:554/p");
        assert!(request.contains(&expected));

        // a 401 does not change state
        assert_eq!(dialog.state(), SourceState::Initial);
    }

    #[test]
    fn test_basic_challenge() {
        let mut dialog = dialog();
        let progress = feed(
            &mut dialog,
            b"RTSP/1.0 401 Unauthorized\r\nCSeq: 1\r\nWWW-Authenticate: Basic realm=\"r\"\r\n\r\n",
        );
        let request = String::from_utf8(progress.send.unwrap().to_vec()).unwrap();
        assert!(request.contains("Authorization: Basic dTpw\r\n")); // base64("u:p")
    }

    #[test]
    fn test_auth_retry_bound_is_five_describes() {
        let mut dialog = dialog();
        let challenge =
            b"RTSP/1.0 401 Unauthorized\r\nCSeq: 1\r\nWWW-Authenticate: Digest realm=\"r\", nonce=\"n\"\r\n\r\n";

        for attempt in 1..=5 {
            let mut buffer = BytesMut::from(&challenge[..]);
            let progress = dialog.on_bytes(&mut buffer).unwrap();
            assert!(progress.send.is_some(), "DESCRIBE attempt {}", attempt);
        }

        let mut buffer = BytesMut::from(&challenge[..]);
        let result = dialog.on_bytes(&mut buffer);
        assert!(matches!(
            result,
            Err(crate::error::Error::Rtsp(
                RtspError::CredentialsNotAccepted(_)
            ))
        ));
    }

    #[test]
    fn test_unexpected_status_is_source_not_found() {
        let mut dialog = dialog();
        let mut buffer = BytesMut::from(&b"RTSP/1.0 404 Not Found\r\nCSeq: 1\r\n\r\n"[..]);
        let result = dialog.on_bytes(&mut buffer);
        assert!(matches!(
            result,
            Err(crate::error::Error::Rtsp(RtspError::SourceNotFound {
                status: 404,
                ..
            }))
        ));
    }

    #[test]
    fn test_sdp_without_video_control_rejected() {
        let mut dialog = dialog();
        options_ok(&mut dialog);
        let body = "v=0\r\nm=video 0 RTP/AVP 96\r\na=rtpmap:96 H264/90000\r\n";
        let mut buffer = BytesMut::from(describe_response(body).as_bytes());
        let result = dialog.on_bytes(&mut buffer);
        assert!(matches!(
            result,
            Err(crate::error::Error::Rtsp(RtspError::InvalidSdp(_)))
        ));
    }

    #[test]
    fn test_absolute_control_url_used_verbatim() {
        let mut dialog = dialog();
        options_ok(&mut dialog);
        let body = "v=0\r\nm=video 0 RTP/AVP 96\r\na=control:rtsp://other:554/abs\r\n";
        let progress = feed(&mut dialog, describe_response(body).as_bytes());
        let request = String::from_utf8(progress.send.unwrap().to_vec()).unwrap();
        assert!(request.starts_with("SETUP rtsp://other:554/abs RTSP/1.0\r\n"));
    }

    #[test]
    fn test_range_from_sdp_used_in_play() {
        let mut dialog = dialog();
        options_ok(&mut dialog);
        let body = "v=0\r\nm=video 0 RTP/AVP 96\r\na=control:trackID=1\r\na=range:npt=0-71.64\r\n";
        feed(&mut dialog, describe_response(body).as_bytes());
        let progress = feed(
            &mut dialog,
            b"RTSP/1.0 200 OK\r\nCSeq: 3\r\nSession: 42\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n",
        );
        let request = String::from_utf8(progress.send.unwrap().to_vec()).unwrap();
        assert!(request.contains("Range: npt=0-71.64\r\n"));
    }

    #[test]
    fn test_multiple_responses_in_one_read() {
        let mut dialog = dialog();
        let mut wire = Vec::new();
        wire.extend_from_slice(
            b"RTSP/1.0 200 OK\r\nCSeq: 1\r\nPublic: OPTIONS, DESCRIBE\r\n\r\n",
        );
        wire.extend_from_slice(describe_response(SDP_VIDEO_ONLY).as_bytes());

        let mut buffer = BytesMut::from(&wire[..]);
        let progress = dialog.on_bytes(&mut buffer).unwrap();

        // both responses processed in order; the SETUP is what's left to send
        let request = String::from_utf8(progress.send.unwrap().to_vec()).unwrap();
        assert!(request.contains("SETUP "));
        assert!(progress.sdp_ready);
        assert_eq!(dialog.state(), SourceState::Described);
    }

    #[test]
    fn test_partial_response_waits() {
        let mut dialog = dialog();
        let mut buffer = BytesMut::from(&b"RTSP/1.0 200 OK\r\nCSeq: 1"[..]);
        let progress = dialog.on_bytes(&mut buffer).unwrap();
        assert!(progress.send.is_none());
        assert_eq!(buffer.len(), 24);
    }

    #[test]
    fn test_partial_body_waits() {
        let mut dialog = dialog();
        options_ok(&mut dialog);
        let full = describe_response(SDP_VIDEO_ONLY);
        let mut buffer = BytesMut::from(&full.as_bytes()[..full.len() - 10]);
        let progress = dialog.on_bytes(&mut buffer).unwrap();
        assert!(progress.send.is_none());

        buffer.extend_from_slice(&full.as_bytes()[full.len() - 10..]);
        let progress = dialog.on_bytes(&mut buffer).unwrap();
        assert!(progress.sdp_ready);
    }

    #[test]
    fn test_cseq_follows_responses() {
        let mut dialog = dialog();
        let progress = feed(
            &mut dialog,
            b"RTSP/1.0 200 OK\r\nCSeq: 7\r\nPublic: DESCRIBE\r\n\r\n",
        );
        let request = String::from_utf8(progress.send.unwrap().to_vec()).unwrap();
        assert!(request.contains("CSeq: 8\r\n"));
    }

    #[test]
    fn test_keepalive_is_cached_options() {
        let mut dialog = RtspDialog::new(None, "");
        let options = dialog.initial_request("h", 554);
        // empty content is normalized to /
        assert!(options.starts_with(b"OPTIONS rtsp://h:554/ RTSP/1.0\r\n"));
        assert_eq!(dialog.keepalive_request(), options);
    }

    #[test]
    fn test_clear_resets_session() {
        let mut dialog = dialog();
        options_ok(&mut dialog);
        feed(&mut dialog, describe_response(SDP_VIDEO_ONLY).as_bytes());
        feed(
            &mut dialog,
            b"RTSP/1.0 200 OK\r\nCSeq: 3\r\nSession: 42;timeout=60\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n",
        );
        dialog.clear();
        assert_eq!(dialog.state(), SourceState::Initial);
        assert_eq!(dialog.keepalive_interval(), None);
    }

    #[test]
    fn test_parse_sprop() {
        let (sps, pps) =
            parse_sprop("packetization-mode=1;sprop-parameter-sets=Z0IAH5WoFAFu,aM48gA==").unwrap();
        assert_eq!(sps[0] & 0x1f, 7);
        assert_eq!(pps[0] & 0x1f, 8);
        assert!(parse_sprop("packetization-mode=1").is_none());
    }
}
