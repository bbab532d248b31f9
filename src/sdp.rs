//! SDP parsing (RFC 4566 / RFC 8866)
//!
//! A DESCRIBE body is a CRLF-separated list of `<type>=<value>` lines: one
//! session-level block followed by one block per `m=` media line. The parse
//! is line-oriented; the session block stops at the first `m=`, which the
//! next media block consumes. Unknown line types are ignored.
//!
//! ```text
//! v=0                                          ← protocol version
//! o=- 1 1 IN IP4 10.0.0.1                      ← origin
//! s=Live                                       ← session name
//! t=0 0                                        ← timing
//! m=video 0 RTP/AVP 96                         ← media description
//! a=rtpmap:96 H264/90000                       ← codec/clock rate
//! a=fmtp:96 packetization-mode=1;sprop-parameter-sets=Z0IA...,aM4...
//! a=control:trackID=1                          ← track control URL
//! ```
//!
//! The `control`, `fmtp` and `rtpmap` attributes of the media blocks are
//! what the dialog and the FLV prologue are built from.

use std::fmt;

/// Attribute list with insertion order preserved; re-setting a name keeps
/// its position and replaces the value (last value wins).
#[derive(Debug, Clone, Default)]
struct Attributes(Vec<(String, String)>);

impl Attributes {
    fn set(&mut self, name: &str, value: &str) {
        if let Some(entry) = self.0.iter_mut().find(|(n, _)| n == name) {
            entry.1 = value.to_string();
        } else {
            self.0.push((name.to_string(), value.to_string()));
        }
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.0 {
            if value.is_empty() {
                write!(f, "a={}\r\n", name)?;
            } else {
                write!(f, "a={}:{}\r\n", name, value)?;
            }
        }
        Ok(())
    }
}

/// Splits an `a=` line into name and value; flag-style attributes
/// (`a=recvonly`) get an empty value.
fn split_attribute(value: &str) -> (&str, &str) {
    match value.split_once(':') {
        Some((name, rest)) => (name, rest),
        None => (value, ""),
    }
}

/// Session-level description: everything before the first `m=` line
#[derive(Debug, Clone, Default)]
pub struct SessionDescription {
    protocol_version: String,
    origin: String,
    session_name: String,
    session_info: String,
    uri: String,
    email: String,
    phone_number: String,
    connection_info: String,
    bandwidth_info: String,
    active_time: String,
    repeat_times: Vec<String>,
    timezone: String,
    encryption_key: String,
    attributes: Attributes,
}

impl SessionDescription {
    /// Consume session-level lines. Returns the number of lines consumed;
    /// the first `m=` line (if any) is left for the media parser.
    fn parse(&mut self, lines: &[&str]) -> usize {
        let mut consumed = 0;
        for line in lines {
            let (kind, value) = match line.split_once('=') {
                Some((k, v)) => (k, v),
                None => {
                    consumed += 1;
                    continue;
                }
            };
            match kind {
                "m" => return consumed,
                "v" => self.protocol_version = value.to_string(),
                "o" => self.origin = value.to_string(),
                "s" => self.session_name = value.to_string(),
                "i" => self.session_info = value.to_string(),
                "u" => self.uri = value.to_string(),
                "e" => self.email = value.to_string(),
                "p" => self.phone_number = value.to_string(),
                "c" => self.connection_info = value.to_string(),
                "b" => self.bandwidth_info = value.to_string(),
                "t" => self.active_time = value.to_string(),
                "r" => self.repeat_times.push(value.to_string()),
                "z" => self.timezone = value.to_string(),
                "k" => self.encryption_key = value.to_string(),
                "a" => {
                    let (name, value) = split_attribute(value);
                    self.attributes.set(name, value);
                }
                _ => {}
            }
            consumed += 1;
        }
        consumed
    }

    /// Session-level attribute lookup
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name)
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v={}\r\n", self.protocol_version)?;
        write!(f, "o={}\r\n", self.origin)?;
        write!(f, "s={}\r\n", self.session_name)?;
        if !self.session_info.is_empty() {
            write!(f, "i={}\r\n", self.session_info)?;
        }
        if !self.uri.is_empty() {
            write!(f, "u={}\r\n", self.uri)?;
        }
        if !self.email.is_empty() {
            write!(f, "e={}\r\n", self.email)?;
        }
        if !self.phone_number.is_empty() {
            write!(f, "p={}\r\n", self.phone_number)?;
        }
        if !self.connection_info.is_empty() {
            write!(f, "c={}\r\n", self.connection_info)?;
        }
        if !self.bandwidth_info.is_empty() {
            write!(f, "b={}\r\n", self.bandwidth_info)?;
        }
        if !self.active_time.is_empty() {
            write!(f, "t={}\r\n", self.active_time)?;
        }
        for repeat in &self.repeat_times {
            write!(f, "r={}\r\n", repeat)?;
        }
        if !self.timezone.is_empty() {
            write!(f, "z={}\r\n", self.timezone)?;
        }
        if !self.encryption_key.is_empty() {
            write!(f, "k={}\r\n", self.encryption_key)?;
        }
        self.attributes.render(f)
    }
}

/// One media block: the `m=` line plus the lines up to the next `m=`
#[derive(Debug, Clone, Default)]
pub struct MediaDescription {
    kind: String,
    port: String,
    transport: String,
    formats: String,
    title: String,
    connection_info: String,
    bandwidth_info: String,
    encryption_key: String,
    attributes: Attributes,
}

impl MediaDescription {
    /// Consume one media block starting at an `m=` line. Returns the number
    /// of lines consumed; a following `m=` line is left for the next block.
    fn parse(&mut self, lines: &[&str]) -> usize {
        let mut consumed = 0;
        for line in lines {
            let (kind, value) = match line.split_once('=') {
                Some((k, v)) => (k, v),
                None => {
                    consumed += 1;
                    continue;
                }
            };
            match kind {
                "m" if consumed > 0 => return consumed,
                "m" => {
                    let mut tokens = value.split_whitespace();
                    self.kind = tokens.next().unwrap_or("").to_string();
                    self.port = tokens.next().unwrap_or("").to_string();
                    self.transport = tokens.next().unwrap_or("").to_string();
                    self.formats = tokens.collect::<Vec<_>>().join(" ");
                }
                "i" => self.title = value.to_string(),
                "c" => self.connection_info = value.to_string(),
                "b" => self.bandwidth_info = value.to_string(),
                "k" => self.encryption_key = value.to_string(),
                "a" => {
                    let (name, value) = split_attribute(value);
                    self.attributes.set(name, value);
                }
                _ => {}
            }
            consumed += 1;
        }
        consumed
    }

    /// Media kind: the first token of the `m=` line (`video`, `audio`, ...)
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Media-level attribute lookup (`control`, `fmtp`, `rtpmap`, ...)
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name)
    }
}

impl fmt::Display for MediaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "m={} {} {} {}\r\n",
            self.kind, self.port, self.transport, self.formats
        )?;
        if !self.title.is_empty() {
            write!(f, "i={}\r\n", self.title)?;
        }
        if !self.connection_info.is_empty() {
            write!(f, "c={}\r\n", self.connection_info)?;
        }
        if !self.bandwidth_info.is_empty() {
            write!(f, "b={}\r\n", self.bandwidth_info)?;
        }
        if !self.encryption_key.is_empty() {
            write!(f, "k={}\r\n", self.encryption_key)?;
        }
        self.attributes.render(f)
    }
}

/// A full session description: the session block plus the media blocks in
/// their original order
#[derive(Debug, Clone, Default)]
pub struct Sdp {
    session: SessionDescription,
    media: Vec<MediaDescription>,
}

impl Sdp {
    /// Parse a DESCRIBE body
    pub fn parse(description: &str) -> Self {
        let lines: Vec<&str> = description.lines().collect();
        let mut sdp = Sdp::default();
        let mut parsed = sdp.session.parse(&lines);
        while parsed < lines.len() {
            let mut media = MediaDescription::default();
            let consumed = media.parse(&lines[parsed..]);
            if consumed == 0 {
                break;
            }
            parsed += consumed;
            sdp.media.push(media);
        }
        sdp
    }

    /// Session-level description
    pub fn session(&self) -> &SessionDescription {
        &self.session
    }

    /// First media block whose kind matches, or `None`
    pub fn media(&self, kind: &str) -> Option<&MediaDescription> {
        self.media.iter().find(|m| m.kind() == kind)
    }
}

impl fmt::Display for Sdp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.session)?;
        for media in &self.media {
            write!(f, "{}", media)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "v=0\r\n\
                        o=- 1 1 IN IP4 10.0.0.1\r\n\
                        s=Live\r\n\
                        t=0 0\r\n\
                        a=recvonly\r\n\
                        m=video 0 RTP/AVP 96\r\n\
                        a=rtpmap:96 H264/90000\r\n\
                        a=fmtp:96 packetization-mode=1;sprop-parameter-sets=Z0IAH5WoFAFu,aM48gA==\r\n\
                        a=control:trackID=1\r\n\
                        m=audio 0 RTP/AVP 97\r\n\
                        a=rtpmap:97 MPEG4-GENERIC/44100/2\r\n\
                        a=control:trackID=2\r\n";

    #[test]
    fn test_parse_session_and_media() {
        let sdp = Sdp::parse(BODY);

        assert_eq!(sdp.session().attribute("recvonly"), Some(""));

        let video = sdp.media("video").unwrap();
        assert_eq!(video.kind(), "video");
        assert_eq!(video.attribute("control"), Some("trackID=1"));
        assert_eq!(video.attribute("rtpmap"), Some("96 H264/90000"));

        let audio = sdp.media("audio").unwrap();
        assert_eq!(audio.attribute("rtpmap"), Some("97 MPEG4-GENERIC/44100/2"));

        assert!(sdp.media("text").is_none());
    }

    #[test]
    fn test_attribute_value_with_colons() {
        let sdp = Sdp::parse("v=0\r\nm=video 0 RTP/AVP 96\r\na=control:rtsp://10.0.0.1/track1\r\n");
        assert_eq!(
            sdp.media("video").unwrap().attribute("control"),
            Some("rtsp://10.0.0.1/track1")
        );
    }

    #[test]
    fn test_last_attribute_value_wins() {
        let sdp = Sdp::parse("v=0\r\nm=video 0 RTP/AVP 96\r\na=control:one\r\na=control:two\r\n");
        assert_eq!(sdp.media("video").unwrap().attribute("control"), Some("two"));
    }

    #[test]
    fn test_unknown_lines_ignored() {
        let sdp = Sdp::parse("v=0\r\nx=whatever\r\nm=video 0 RTP/AVP 96\r\nq=junk\r\na=control:t\r\n");
        assert_eq!(sdp.media("video").unwrap().attribute("control"), Some("t"));
    }

    #[test]
    fn test_render_canonical_order() {
        let sdp = Sdp::parse(BODY);
        let rendered = sdp.to_string();

        // session lines first, then the media blocks in insertion order
        let v = rendered.find("v=0").unwrap();
        let video = rendered.find("m=video").unwrap();
        let audio = rendered.find("m=audio").unwrap();
        assert!(v < video && video < audio);
        assert!(rendered.contains("a=control:trackID=1\r\n"));

        // a reparse sees the same attributes
        let again = Sdp::parse(&rendered);
        assert_eq!(
            again.media("audio").unwrap().attribute("control"),
            Some("trackID=2")
        );
    }

    #[test]
    fn test_media_without_session_lines() {
        let sdp = Sdp::parse("m=video 0 RTP/AVP 96\r\na=control:t\r\n");
        assert!(sdp.media("video").is_some());
    }

    #[test]
    fn test_empty_body() {
        let sdp = Sdp::parse("");
        assert!(sdp.media("video").is_none());
    }
}
